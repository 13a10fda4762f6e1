// ABOUTME: Wires configuration, conversation storage, backends, and the coordinator together.
// ABOUTME: Storage is SQLite by default or in-memory for --ephemeral invocations.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_agent::{
    ApprovalSurface, BackendRegistry, Conversation, ConversationStore, InMemoryConversationStore,
    SessionIdentityStore,
};
use switchyard_core::{RuntimeSelector, SqliteConversationStore, StreamCoordinator};

/// Where conversations live for this process
#[derive(Clone)]
pub enum Storage {
    Sqlite(SqliteConversationStore),
    Memory(Arc<InMemoryConversationStore>),
}

impl Storage {
    pub fn open(config: &AppConfig, ephemeral: bool) -> Result<Self> {
        if ephemeral {
            tracing::info!("Using in-memory conversation store");
            return Ok(Self::Memory(Arc::new(InMemoryConversationStore::new())));
        }
        let store = SqliteConversationStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open conversation store at {}", config.storage.path))?;
        Ok(Self::Sqlite(store))
    }

    pub fn shared(&self) -> Arc<dyn ConversationStore> {
        match self {
            Self::Sqlite(store) => Arc::new(store.clone()),
            Self::Memory(store) => Arc::clone(store) as Arc<dyn ConversationStore>,
        }
    }

    pub fn create(&self, id: &str, working_directory: &Path) -> Result<Conversation> {
        match self {
            Self::Sqlite(store) => store.create_conversation(id, working_directory),
            Self::Memory(store) => {
                let conversation = Conversation::new(id, working_directory);
                store.insert(conversation.clone());
                Ok(conversation)
            }
        }
    }

    pub fn list(&self) -> Result<Vec<Conversation>> {
        match self {
            Self::Sqlite(store) => store.list_conversations(),
            Self::Memory(_) => Ok(Vec::new()),
        }
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        match self {
            Self::Sqlite(store) => store.delete_conversation(id),
            Self::Memory(store) => Ok(store.remove(id)),
        }
    }

    /// Existing conversation, or one registered on the spot in ephemeral mode
    pub async fn conversation(&self, id: &str, cwd: Option<&Path>) -> Result<Conversation> {
        if let Some(conversation) = self.shared().get_conversation(id).await? {
            return Ok(conversation);
        }
        match self {
            Self::Memory(_) => {
                let dir = match cwd {
                    Some(dir) => dir.to_path_buf(),
                    None => current_dir()?,
                };
                self.create(id, &dir)
            }
            Self::Sqlite(_) => anyhow::bail!(
                "Unknown conversation '{}'. Create it with `switchyard new {} --cwd <dir>`",
                id,
                id
            ),
        }
    }
}

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to determine current directory")
}

/// Everything a CLI invocation needs
pub struct App {
    pub storage: Storage,
    pub coordinator: StreamCoordinator,
}

impl App {
    pub fn build(
        config: &AppConfig,
        storage: Storage,
        approval: Arc<dyn ApprovalSurface>,
        runtime_override: Option<String>,
    ) -> Result<Self> {
        let store = storage.shared();
        let identities = SessionIdentityStore::new(Arc::clone(&store));
        let registry = BackendRegistry::from_config(&config.backends, identities, approval)?;

        let mut selector =
            RuntimeSelector::new(store).with_override_env(config.runtime.override_env());
        if let Some(default) = &config.runtime.default {
            selector = selector.with_default(default.clone());
        }
        if let Some(runtime) = runtime_override {
            selector = selector.with_override(runtime);
        }

        tracing::debug!(available = ?registry.available(), "Backends registered");
        Ok(Self {
            storage,
            coordinator: StreamCoordinator::new(selector, registry),
        })
    }
}
