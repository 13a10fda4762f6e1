// ABOUTME: Runtime selector - decides which backend variant a conversation's next run uses.
// ABOUTME: Evaluated fresh per run: process override, conversation override, global default, fallback.

use crate::metrics;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use switchyard_agent::{ConversationStore, Metadata, RuntimeKind};

/// Metadata key (per conversation) and settings key (global) holding a runtime name
pub const RUNTIME_KEY: &str = "agentRuntime";

/// Environment variable consulted for the process-wide override
pub const DEFAULT_OVERRIDE_ENV: &str = "SWITCHYARD_AGENT_RUNTIME";

/// Kind used when nothing else yields a valid value
pub const FALLBACK_RUNTIME: RuntimeKind = RuntimeKind::GraphCheckpoint;

/// Which precedence level produced the resolved kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// Explicit override or environment variable
    ProcessOverride,
    /// `agentRuntime` in the conversation's metadata
    Conversation,
    /// `agentRuntime` in global settings
    GlobalSetting,
    /// Default from the configuration file
    ConfiguredDefault,
    Fallback,
}

impl SelectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessOverride => "process-override",
            Self::Conversation => "conversation",
            Self::GlobalSetting => "global-setting",
            Self::ConfiguredDefault => "configured-default",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct RuntimeSelector {
    store: Arc<dyn ConversationStore>,
    explicit_override: Option<String>,
    override_env: Option<String>,
    configured_default: Option<String>,
}

impl RuntimeSelector {
    /// Selector reading the default override variable
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            explicit_override: None,
            override_env: Some(DEFAULT_OVERRIDE_ENV.to_string()),
            configured_default: None,
        }
    }

    /// Force every conversation onto one runtime for this process
    pub fn with_override(mut self, runtime: impl Into<String>) -> Self {
        self.explicit_override = Some(runtime.into());
        self
    }

    /// Read the process override from a different variable; `None` disables it
    pub fn with_override_env(mut self, name: Option<String>) -> Self {
        self.override_env = name;
        self
    }

    pub fn with_default(mut self, runtime: impl Into<String>) -> Self {
        self.configured_default = Some(runtime.into());
        self
    }

    pub async fn resolve(&self, conversation_id: &str) -> RuntimeKind {
        self.resolve_with_source(conversation_id).await.0
    }

    /// Resolve and report which precedence level won
    pub async fn resolve_with_source(&self, conversation_id: &str) -> (RuntimeKind, SelectionSource) {
        let (kind, source) = self.evaluate(conversation_id).await;
        tracing::debug!(
            conversation_id = %conversation_id,
            runtime = %kind,
            source = %source,
            "Resolved runtime"
        );
        metrics::record_runtime_resolution(kind, source.as_str());
        (kind, source)
    }

    async fn evaluate(&self, conversation_id: &str) -> (RuntimeKind, SelectionSource) {
        if let Some(kind) = accept(self.explicit_override.as_deref(), "explicit override") {
            return (kind, SelectionSource::ProcessOverride);
        }
        if let Some(name) = &self.override_env {
            let value = std::env::var(name).ok();
            if let Some(kind) = accept(value.as_deref(), name) {
                return (kind, SelectionSource::ProcessOverride);
            }
        }

        match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => {
                let value = conversation.metadata.get(RUNTIME_KEY).and_then(|v| v.as_str());
                if let Some(kind) = accept(value, "conversation metadata") {
                    return (kind, SelectionSource::Conversation);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "Failed to read conversation for runtime override"
            ),
        }

        match self.store.get_setting(RUNTIME_KEY).await {
            Ok(value) => {
                if let Some(kind) = accept(value.as_deref(), "global setting") {
                    return (kind, SelectionSource::GlobalSetting);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read global runtime setting"),
        }

        if let Some(kind) = accept(self.configured_default.as_deref(), "configured default") {
            return (kind, SelectionSource::ConfiguredDefault);
        }

        (FALLBACK_RUNTIME, SelectionSource::Fallback)
    }

    /// Pin a conversation to a runtime
    pub async fn set_conversation_runtime(&self, conversation_id: &str, kind: RuntimeKind) -> Result<()> {
        let mut partial = Metadata::new();
        partial.insert(RUNTIME_KEY.to_string(), Value::String(kind.as_str().to_string()));
        self.store.update_metadata(conversation_id, partial).await?;
        tracing::info!(conversation_id = %conversation_id, runtime = %kind, "Conversation runtime set");
        Ok(())
    }

    /// Drop a conversation's pin so it follows the global default again
    pub async fn clear_conversation_runtime(&self, conversation_id: &str) -> Result<()> {
        let mut partial = Metadata::new();
        partial.insert(RUNTIME_KEY.to_string(), Value::Null);
        self.store.update_metadata(conversation_id, partial).await?;
        tracing::info!(conversation_id = %conversation_id, "Conversation runtime cleared");
        Ok(())
    }

    pub async fn set_default_runtime(&self, kind: RuntimeKind) -> Result<()> {
        self.store.set_setting(RUNTIME_KEY, kind.as_str()).await
    }
}

/// Validate one candidate; absent or unknown values fall through
fn accept(value: Option<&str>, origin: &str) -> Option<RuntimeKind> {
    let value = value?;
    if value.trim().is_empty() {
        return None;
    }
    let kind = RuntimeKind::parse(value);
    if kind.is_none() {
        tracing::warn!(origin = %origin, value = %value, "Ignoring unknown runtime name");
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_agent::{Conversation, InMemoryConversationStore};

    fn selector(store: Arc<InMemoryConversationStore>) -> RuntimeSelector {
        RuntimeSelector::new(store).with_override_env(None)
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_set() {
        let store = Arc::new(InMemoryConversationStore::new());
        let (kind, source) = selector(store).resolve_with_source("missing").await;
        assert_eq!(kind, RuntimeKind::GraphCheckpoint);
        assert_eq!(source, SelectionSource::Fallback);
    }

    #[tokio::test]
    async fn test_invalid_values_fall_through() {
        let store = Arc::new(InMemoryConversationStore::new());
        store.insert(Conversation::new("c1", "/tmp").with_metadata(RUNTIME_KEY, json!("mystery")));
        store.set_setting(RUNTIME_KEY, "Thread-Based").await.unwrap();

        let selector = selector(store)
            .with_override("")
            .with_default("thread-based");
        assert_eq!(
            selector.resolve_with_source("c1").await,
            (RuntimeKind::ThreadBased, SelectionSource::ConfiguredDefault)
        );
    }

    #[tokio::test]
    async fn test_non_string_metadata_falls_through() {
        let store = Arc::new(InMemoryConversationStore::new());
        store.insert(Conversation::new("c1", "/tmp").with_metadata(RUNTIME_KEY, json!(3)));
        store.set_setting(RUNTIME_KEY, "session-resumable").await.unwrap();
        assert_eq!(
            selector(store).resolve_with_source("c1").await,
            (RuntimeKind::SessionResumable, SelectionSource::GlobalSetting)
        );
    }

    #[test]
    fn test_accept_is_exact() {
        assert_eq!(accept(Some("graph-checkpoint"), "t"), Some(RuntimeKind::GraphCheckpoint));
        assert_eq!(accept(Some("graph"), "t"), None);
        assert_eq!(accept(None, "t"), None);
    }
}
