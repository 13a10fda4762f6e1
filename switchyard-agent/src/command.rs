// ABOUTME: Run inputs and the closed set of runtime kinds every backend is selected from.
// ABOUTME: Turn, resume, and interrupt arguments map one-to-one onto the three backend operations.

use crate::event::HitlDecision;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The three backend variants a conversation can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// Checkpointed state-machine graph resumed via structured commands
    GraphCheckpoint,
    /// Session-resumable chat API with a mid-turn permission callback
    SessionResumable,
    /// Thread-based turn API with a sandbox policy chosen before the turn
    ThreadBased,
}

/// How a backend pauses for human approval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// Persisted checkpoint; the run ends and a later run resumes it exactly
    Checkpoint,
    /// Synchronous callback inside native execution; cannot be resumed once it returns
    InProcess,
    /// One yes/no gate before the turn starts
    Upfront,
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 3] = [
        RuntimeKind::GraphCheckpoint,
        RuntimeKind::SessionResumable,
        RuntimeKind::ThreadBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GraphCheckpoint => "graph-checkpoint",
            Self::SessionResumable => "session-resumable",
            Self::ThreadBased => "thread-based",
        }
    }

    /// Accepts only the exact kind names; anything else is `None`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Conversation metadata key holding this backend's native session/thread id
    pub fn session_key(&self) -> &'static str {
        match self {
            Self::GraphCheckpoint => "graphCheckpointSessionId",
            Self::SessionResumable => "sessionResumableSessionId",
            Self::ThreadBased => "threadBasedSessionId",
        }
    }

    pub fn pause_kind(&self) -> PauseKind {
        match self {
            Self::GraphCheckpoint => PauseKind::Checkpoint,
            Self::SessionResumable => PauseKind::InProcess,
            Self::ThreadBased => PauseKind::Upfront,
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown runtime '{}'. Expected one of: graph-checkpoint, session-resumable, thread-based",
                s
            )
        })
    }
}

/// The three protocol operations, named for errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Begin,
    ContinueFromCheckpoint,
    RespondToInterrupt,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::ContinueFromCheckpoint => "continueFromCheckpoint",
            Self::RespondToInterrupt => "respondToInterrupt",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new user message for a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnInput {
    pub conversation_id: String,
    pub message: String,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Unconditional continuation after an out-of-band approval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeArgs {
    pub conversation_id: String,
    pub working_directory: PathBuf,
    /// Backend-specific resume payload, e.g. `{"decision": "approve"}`
    pub payload: Value,
}

/// Consumer decision for a paused run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptArgs {
    pub conversation_id: String,
    pub working_directory: PathBuf,
    pub decision: HitlDecision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_only_known_kinds() {
        assert_eq!(
            RuntimeKind::parse("session-resumable"),
            Some(RuntimeKind::SessionResumable)
        );
        assert_eq!(
            RuntimeKind::parse(" thread-based "),
            Some(RuntimeKind::ThreadBased)
        );
        assert_eq!(RuntimeKind::parse("Thread-Based"), None);
        assert_eq!(RuntimeKind::parse("langgraph"), None);
        assert_eq!(RuntimeKind::parse(""), None);
    }

    #[test]
    fn test_session_keys_are_distinct() {
        let keys: std::collections::HashSet<_> =
            RuntimeKind::ALL.iter().map(|k| k.session_key()).collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(
            RuntimeKind::GraphCheckpoint.session_key(),
            "graphCheckpointSessionId"
        );
    }

    #[test]
    fn test_from_str_error_lists_kinds() {
        let err = "mux".parse::<RuntimeKind>().unwrap_err();
        assert!(err.to_string().contains("graph-checkpoint"));
    }
}
