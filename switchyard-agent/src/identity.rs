// ABOUTME: Session Identity Store mapping a conversation to each backend's native session/thread id.
// ABOUTME: Reads tolerate corrupt metadata as "absent"; writes touch a single metadata key.

use crate::command::RuntimeKind;
use crate::conversation::{ConversationStore, Metadata};
use crate::error::RunFailure;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// One native identifier slot per backend kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSessionIds {
    pub graph_checkpoint: Option<String>,
    pub session_resumable: Option<String>,
    pub thread_based: Option<String>,
}

impl NativeSessionIds {
    /// Parse every slot independently so one corrupt key cannot hide the others
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mut ids = Self::default();
        for kind in RuntimeKind::ALL {
            *ids.slot_mut(kind) = parse_slot(kind.session_key(), metadata.get(kind.session_key()));
        }
        ids
    }

    pub fn get(&self, kind: RuntimeKind) -> Option<&str> {
        match kind {
            RuntimeKind::GraphCheckpoint => self.graph_checkpoint.as_deref(),
            RuntimeKind::SessionResumable => self.session_resumable.as_deref(),
            RuntimeKind::ThreadBased => self.thread_based.as_deref(),
        }
    }

    fn slot_mut(&mut self, kind: RuntimeKind) -> &mut Option<String> {
        match kind {
            RuntimeKind::GraphCheckpoint => &mut self.graph_checkpoint,
            RuntimeKind::SessionResumable => &mut self.session_resumable,
            RuntimeKind::ThreadBased => &mut self.thread_based,
        }
    }
}

fn parse_slot(key: &str, value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
        Some(other) => {
            let failure = RunFailure::IdentityCorruption {
                key: key.to_string(),
            };
            tracing::warn!(value = %other, "{failure}; starting fresh");
            None
        }
    }
}

/// Native identifier lookup over conversation metadata
#[derive(Clone)]
pub struct SessionIdentityStore {
    store: Arc<dyn ConversationStore>,
}

impl SessionIdentityStore {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// All native identifiers for a conversation; any failure reads as absent
    pub async fn snapshot(&self, conversation_id: &str) -> NativeSessionIds {
        match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => NativeSessionIds::from_metadata(&conversation.metadata),
            Ok(None) => NativeSessionIds::default(),
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to read conversation metadata; treating identifiers as absent"
                );
                NativeSessionIds::default()
            }
        }
    }

    /// Native identifier for one backend, `None` means start fresh
    pub async fn get(&self, conversation_id: &str, kind: RuntimeKind) -> Option<String> {
        self.snapshot(conversation_id)
            .await
            .get(kind)
            .map(str::to_string)
    }

    /// Record a newly revealed native identifier without touching other keys
    pub async fn set(&self, conversation_id: &str, kind: RuntimeKind, native_id: &str) -> Result<()> {
        let mut partial = Metadata::new();
        partial.insert(
            kind.session_key().to_string(),
            Value::String(native_id.to_string()),
        );
        self.store.update_metadata(conversation_id, partial).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            runtime = %kind,
            native_id = %native_id,
            "Recorded native session id"
        );
        Ok(())
    }

    /// `set` for use inside a run: failures are logged, never surfaced
    pub async fn record(&self, conversation_id: &str, kind: RuntimeKind, native_id: &str) {
        if let Err(e) = self.set(conversation_id, kind, native_id).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                runtime = %kind,
                error = %e,
                "Failed to persist native session id"
            );
        }
    }
}
