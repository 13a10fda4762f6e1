// ABOUTME: Stream events and HITL decisions exchanged between runtime backends and consumers.
// ABOUTME: Includes the run identifier and detection of interrupt markers inside full-state updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// State key under which a checkpointed graph records its pending interrupts
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// Events emitted by a runtime backend during one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Partial assistant text
    Token {
        #[serde(rename = "messageId")]
        message_id: String,
        text: String,
    },

    /// Opaque execution-state payload from backends that expose graph state
    StateUpdate { mode: UpdateMode, state: Value },

    /// Run finished successfully
    Done,

    /// Run failed
    Error { message: String },
}

/// Distinguishes token-oriented updates from full-state snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Incremental message chunks
    Messages,
    /// Full state after a graph step
    Values,
}

impl StreamEvent {
    pub fn token(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Token {
            message_id: message_id.into(),
            text: text.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True for `Done` and `Error`; nothing follows a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Short tag used in logs and metrics
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::StateUpdate { .. } => "stateUpdate",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Pending actions recorded by an interrupt marker in a full-state update.
    ///
    /// Pauses are not a dedicated event: a checkpointed graph stops and its
    /// last `Values` snapshot carries an `__interrupt__` entry naming the
    /// actions awaiting a decision. Returns an empty list for every other event.
    pub fn pending_interrupt(&self) -> Vec<PendingAction> {
        let Self::StateUpdate {
            mode: UpdateMode::Values,
            state,
        } = self
        else {
            return Vec::new();
        };

        let Some(entries) = state.get(INTERRUPT_KEY).and_then(|v| v.as_array()) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        for entry in entries {
            let value = entry.get("value").unwrap_or(entry);
            if let Some(requests) = value.get("action_requests").and_then(|r| r.as_array()) {
                actions.extend(requests.iter().filter_map(PendingAction::from_value));
            } else if let Some(action) = PendingAction::from_value(value) {
                actions.push(action);
            }
        }
        actions
    }
}

/// An action a paused backend is waiting to have approved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    pub name: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PendingAction {
    fn from_value(value: &Value) -> Option<Self> {
        let name = value
            .get("name")
            .or_else(|| value.get("action"))
            .and_then(|n| n.as_str())?
            .to_string();
        let args = value
            .get("args")
            .or_else(|| value.get("arguments"))
            .cloned()
            .unwrap_or(Value::Null);
        let description = value
            .get("description")
            .and_then(|d| d.as_str())
            .map(str::to_string);
        Some(Self {
            name,
            args,
            description,
        })
    }
}

/// Consumer decision for a paused run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HitlDecision {
    Approve,
    Reject,
    /// Approve with replacement arguments for the pending action
    Edit { args: Value },
}

impl HitlDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Edit { .. } => "edit",
        }
    }
}

/// Identity of one run; only the newest run for a conversation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
