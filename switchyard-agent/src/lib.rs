// ABOUTME: Runtime backends for switchyard - one streaming contract over three agent execution models.
// ABOUTME: Provides the event model, backend variants, session identity store, and approval surface.

pub mod approval;
pub mod backends;
pub mod command;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod guard;
pub mod handle;
pub mod identity;
pub mod registry;
pub mod testing;
pub mod traits;

pub use approval::{
    ApprovalRequest, ApprovalSurface, ChannelApprovalSurface, PermissionDecision, StaticApproval,
    ToolPermissionRequest, TurnApprovalRequest,
};
pub use command::{InterruptArgs, Operation, PauseKind, ResumeArgs, RuntimeKind, TurnInput};
pub use config::BackendsConfig;
pub use conversation::{Conversation, ConversationStore, InMemoryConversationStore, Metadata};
pub use error::RunFailure;
pub use event::{HitlDecision, PendingAction, RunId, StreamEvent, UpdateMode};
pub use handle::EventReceiver;
pub use identity::{NativeSessionIds, SessionIdentityStore};
pub use registry::BackendRegistry;
pub use traits::RuntimeBackend;
