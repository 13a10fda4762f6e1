// ABOUTME: Runtime backend variants and the native clients that drive them.
// ABOUTME: Each variant implements RuntimeBackend over a narrow trait seam for its native API.

pub mod graph_checkpoint;
pub mod graph_http;
pub mod session_resumable;
pub mod claude_cli;
pub mod thread_based;
pub mod codex_cli;

pub use graph_checkpoint::GraphCheckpointBackend;
pub use session_resumable::SessionResumableBackend;
pub use thread_based::ThreadBasedBackend;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;

/// Drain a child's stderr into the log so the pipe never fills
pub(crate) fn spawn_stderr_logger(stderr: ChildStderr, label: &'static str) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::warn!(stderr = %line, "{} stderr", label);
            }
        }
    });
}
