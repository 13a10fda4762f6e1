// ABOUTME: Conversation record and the persistence collaborator the core reads and writes through.
// ABOUTME: Includes an in-memory store used by tests and ephemeral sessions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Free-form conversation metadata; the core only touches a few keys
pub type Metadata = Map<String, Value>;

/// A persistent unit of dialogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Conversation {
    pub fn new(id: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            working_directory: working_directory.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Persistence collaborator owning conversation metadata and global settings
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation, `None` if it does not exist
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Merge `partial` into the conversation's metadata.
    ///
    /// Only the given keys change; a `null` value removes its key.
    async fn update_metadata(&self, id: &str, partial: Metadata) -> Result<()>;

    /// Read a process-wide setting
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Write a process-wide setting
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Apply a partial update with single-key granularity
pub fn merge_metadata(target: &mut Metadata, partial: Metadata) {
    for (key, value) in partial {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Conversation store held entirely in memory
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    settings: RwLock<HashMap<String, String>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a conversation
    pub fn insert(&self, conversation: Conversation) {
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation.id.clone(), conversation);
    }

    /// Remove a conversation and everything stored with it
    pub fn remove(&self, id: &str) -> bool {
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }

    async fn update_metadata(&self, id: &str, partial: Metadata) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap_or_else(|e| e.into_inner());
        let conversation = conversations
            .get_mut(id)
            .with_context(|| format!("Conversation not found: {}", id))?;
        merge_metadata(&mut conversation.metadata, partial);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
