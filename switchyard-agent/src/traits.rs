// ABOUTME: Core RuntimeBackend trait that all backend variants implement.
// ABOUTME: Defines the begin / continue / respond-to-interrupt contract over lazy event streams.

use crate::command::{InterruptArgs, ResumeArgs, RuntimeKind, TurnInput};
use crate::event::StreamEvent;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Uniform contract over one native execution model.
///
/// Every operation starts a fresh run and returns a lazy, single-consumer
/// stream. Nothing happens until the stream is polled, and a stream cannot be
/// restarted. A completed run ends with exactly one `Done` or `Error`; a
/// cancelled run ends without a terminal event.
pub trait RuntimeBackend: Send + Sync {
    /// Which variant this backend implements
    fn kind(&self) -> RuntimeKind;

    /// Start (or continue) a turn with a new user message
    fn begin(&self, input: TurnInput, cancel: CancellationToken) -> BoxStream<'static, StreamEvent>;

    /// Continue unconditionally after an out-of-band approval
    fn continue_from_checkpoint(
        &self,
        args: ResumeArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent>;

    /// Apply an approve / reject / edit decision to a paused run
    fn respond_to_interrupt(
        &self,
        args: InterruptArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent>;
}
