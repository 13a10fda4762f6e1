// ABOUTME: Failure taxonomy for runs and its mapping onto terminal stream events.
// ABOUTME: Cancellation side-effects are swallowed; everything else becomes a descriptive error event.

use crate::command::{Operation, RuntimeKind};
use crate::event::StreamEvent;
use tokio_util::sync::CancellationToken;

/// Why a run stopped short of `Done`
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    /// Transport abort or close caused by our own cancellation
    #[error("run cancelled")]
    CancellationNoise,

    /// Any other failure from the native execution call
    #[error("{0}")]
    Backend(String),

    /// The variant lacks this capability
    #[error("{runtime} runtime does not support {operation}")]
    Unsupported {
        runtime: RuntimeKind,
        operation: Operation,
    },

    /// Resume or interrupt without a recorded native identifier
    #[error("no {runtime} session recorded for conversation {conversation_id}; start a turn first")]
    MissingSession {
        runtime: RuntimeKind,
        conversation_id: String,
    },

    /// Stored identifier could not be parsed; recovered as a fresh start
    #[error("stored value for {key} is not a usable identifier")]
    IdentityCorruption { key: String },
}

impl RunFailure {
    /// Terminal event for this failure, or `None` when it must stay silent
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            Self::CancellationNoise => None,
            other => Some(StreamEvent::error(other.to_string())),
        }
    }
}

/// Messages native transports produce when we tear them down ourselves
const CANCELLATION_NOISE: &[&str] = &[
    "aborted",
    "aborterror",
    "controller is already closed",
    "controller already closed",
    "operation was cancelled",
    "operation was canceled",
    "run cancelled",
];

/// True when an error message is a side-effect of cancellation
pub fn is_cancellation_noise(message: &str) -> bool {
    let lower = message.to_lowercase();
    CANCELLATION_NOISE.iter().any(|pattern| lower.contains(pattern))
}

/// Classify a native failure. Only a run whose token is triggered can be noise;
/// an abort-looking message on a live run is still a real failure.
pub fn classify_failure(err: &anyhow::Error, cancel: &CancellationToken) -> RunFailure {
    classify_message(format!("{:#}", err), cancel)
}

/// Same as [`classify_failure`] for failures reported as plain text
pub fn classify_message(message: String, cancel: &CancellationToken) -> RunFailure {
    if cancel.is_cancelled() {
        tracing::debug!(
            %message,
            abort = is_cancellation_noise(&message),
            "Swallowing failure after cancellation"
        );
        RunFailure::CancellationNoise
    } else {
        RunFailure::Backend(message)
    }
}
