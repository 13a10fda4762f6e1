// ABOUTME: Human-approval surface the HITL flow blocks on (tool permission and upfront turn gate).
// ABOUTME: Ships a static policy and a channel-backed surface for UIs that answer asynchronously.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// A backend wants to run a tool mid-turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolPermissionRequest {
    pub conversation_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// Answer to a tool permission request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_input: Option<Value>,
    },
    Deny {
        message: String,
    },
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// A backend that cannot prompt mid-turn asks once before starting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnApprovalRequest {
    pub conversation_id: String,
    pub message: String,
    pub working_directory: PathBuf,
}

/// The consumer-side approval UI
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    /// Blocks until the user allows or denies one tool invocation
    async fn request_tool_permission(&self, request: ToolPermissionRequest) -> PermissionDecision;

    /// Blocks until the user allows or denies write access for a whole turn
    async fn request_turn_approval(&self, request: TurnApprovalRequest) -> bool;
}

/// Answers every request the same way
#[derive(Debug, Clone, Copy)]
pub struct StaticApproval {
    allow: bool,
}

impl StaticApproval {
    pub fn allow_all() -> Self {
        Self { allow: true }
    }

    pub fn deny_all() -> Self {
        Self { allow: false }
    }
}

#[async_trait]
impl ApprovalSurface for StaticApproval {
    async fn request_tool_permission(&self, request: ToolPermissionRequest) -> PermissionDecision {
        if self.allow {
            PermissionDecision::allow()
        } else {
            PermissionDecision::deny(format!("{} denied by policy", request.tool_name))
        }
    }

    async fn request_turn_approval(&self, _request: TurnApprovalRequest) -> bool {
        self.allow
    }
}

/// Requests forwarded to an external UI
#[derive(Debug)]
pub enum ApprovalRequest {
    ToolPermission {
        request: ToolPermissionRequest,
        reply: oneshot::Sender<PermissionDecision>,
    },
    Turn {
        request: TurnApprovalRequest,
        reply: oneshot::Sender<bool>,
    },
}

/// Forwards requests over a channel; a dropped reply counts as a denial
#[derive(Clone)]
pub struct ChannelApprovalSurface {
    tx: mpsc::Sender<ApprovalRequest>,
}

impl ChannelApprovalSurface {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ApprovalSurface for ChannelApprovalSurface {
    async fn request_tool_permission(&self, request: ToolPermissionRequest) -> PermissionDecision {
        let tool_name = request.tool_name.clone();
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(ApprovalRequest::ToolPermission { request, reply })
            .await
            .is_err()
        {
            tracing::warn!(tool = %tool_name, "Approval surface closed, denying tool");
            return PermissionDecision::deny("approval surface closed");
        }
        rx.await
            .unwrap_or_else(|_| PermissionDecision::deny("approval dismissed"))
    }

    async fn request_turn_approval(&self, request: TurnApprovalRequest) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(ApprovalRequest::Turn { request, reply })
            .await
            .is_err()
        {
            tracing::warn!("Approval surface closed, denying turn");
            return false;
        }
        rx.await.unwrap_or(false)
    }
}
