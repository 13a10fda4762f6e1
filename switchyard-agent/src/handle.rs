// ABOUTME: EventReceiver is the consumer's end of one run's event channel.
// ABOUTME: Send so it can cross task boundaries; closes without a terminal event when the run is cancelled.

use crate::event::StreamEvent;
use tokio::sync::mpsc;

/// Receiver for the events of one run
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventReceiver {
    /// Create a new EventReceiver wrapping the given channel
    pub fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or None once the run is over
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every remaining event until the run ends
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
