// ABOUTME: Stream wrapper that enforces cancellation and terminal-event rules on backend output.
// ABOUTME: Checks the run's token before every emission and ends the stream after a terminal event.

use crate::event::StreamEvent;
use futures::stream::{BoxStream, Stream};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

pin_project! {
    /// Backend event stream bound to one run's cancellation token
    pub struct Guarded<S> {
        #[pin]
        inner: S,
        token: CancellationToken,
        cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
        finished: bool,
    }
}

impl<S> Stream for Guarded<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        // Wake up on cancellation even while the backend is parked on I/O
        if this.cancelled.as_mut().poll(cx).is_ready() {
            *this.finished = true;
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if this.token.is_cancelled() {
                    *this.finished = true;
                    return Poll::Ready(None);
                }
                if event.is_terminal() {
                    *this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                *this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bind a backend stream to a run's token.
///
/// Once the token is triggered nothing further is emitted, `Done` included.
/// After the first terminal event the stream ends even if the backend keeps
/// producing.
pub fn guard<S>(stream: S, token: CancellationToken) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    Box::pin(Guarded {
        inner: stream,
        cancelled: Box::pin(token.clone().cancelled_owned()),
        token,
        finished: false,
    })
}

/// A run that emits a single event and ends
pub fn single(event: StreamEvent, token: CancellationToken) -> BoxStream<'static, StreamEvent> {
    guard(futures::stream::iter([event]), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stops_after_first_terminal() {
        let token = CancellationToken::new();
        let events = futures::stream::iter(vec![
            StreamEvent::token("m1", "a"),
            StreamEvent::Done,
            StreamEvent::token("m1", "late"),
            StreamEvent::Done,
        ]);
        let collected: Vec<_> = guard(events, token).collect().await;
        assert_eq!(
            collected,
            vec![StreamEvent::token("m1", "a"), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_emits_nothing_once_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let events = futures::stream::iter(vec![StreamEvent::token("m1", "a"), StreamEvent::Done]);
        let collected: Vec<_> = guard(events, token).collect().await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_wakes_pending_stream() {
        let token = CancellationToken::new();
        let mut stream = guard(futures::stream::pending::<StreamEvent>(), token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            token.cancel();
        });
        assert_eq!(stream.next().await, None);
        canceller.await.unwrap();
    }
}
