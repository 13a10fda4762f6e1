// ABOUTME: Runtime selection and single-run stream coordination for switchyard conversations.
// ABOUTME: Also provides the SQLite conversation store and run lifecycle metrics.

pub mod coordinator;
pub mod metrics;
pub mod selector;
pub mod store;

pub use coordinator::{RunHandle, RunRequest, RunState, StreamCoordinator};
pub use selector::{RuntimeSelector, SelectionSource, DEFAULT_OVERRIDE_ENV, RUNTIME_KEY};
pub use store::SqliteConversationStore;
