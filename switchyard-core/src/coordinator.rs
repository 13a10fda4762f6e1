// ABOUTME: Stream coordinator - at most one active run per conversation, newest submission wins.
// ABOUTME: Owns the run-slot arena, forwards backend events, and finalizes runs on terminal or cancel.

use crate::metrics;
use crate::selector::RuntimeSelector;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use switchyard_agent::guard::single;
use switchyard_agent::{
    BackendRegistry, EventReceiver, InterruptArgs, Operation, ResumeArgs, RunId, RuntimeKind,
    StreamEvent, TurnInput,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Message synthesized when a backend stream ends without `Done` or `Error`
pub const UNTERMINATED_STREAM: &str = "stream ended without a terminal event";

/// Work submitted for a conversation
#[derive(Debug, Clone)]
pub enum RunRequest {
    Turn(TurnInput),
    Resume(ResumeArgs),
    Interrupt(InterruptArgs),
}

impl RunRequest {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Turn(input) => &input.conversation_id,
            Self::Resume(args) => &args.conversation_id,
            Self::Interrupt(args) => &args.conversation_id,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Turn(_) => Operation::Begin,
            Self::Resume(_) => Operation::ContinueFromCheckpoint,
            Self::Interrupt(_) => Operation::RespondToInterrupt,
        }
    }
}

/// Consumer's view of one submitted run
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: RunId,
    pub conversation_id: String,
    pub runtime: RuntimeKind,
    /// Closes after the terminal event, or without one if the run is cancelled
    pub events: EventReceiver,
}

/// Per-conversation coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running {
        run_id: RunId,
        /// `None` while the runtime is still being resolved
        runtime: Option<RuntimeKind>,
    },
}

struct RunSlot {
    run_id: RunId,
    runtime: Option<RuntimeKind>,
    token: CancellationToken,
}

type Slots = Arc<Mutex<HashMap<String, RunSlot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, RunSlot>> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Routes runs to backends and enforces the single-active-run invariant
#[derive(Clone)]
pub struct StreamCoordinator {
    selector: RuntimeSelector,
    registry: BackendRegistry,
    slots: Slots,
}

impl StreamCoordinator {
    pub fn new(selector: RuntimeSelector, registry: BackendRegistry) -> Self {
        Self {
            selector,
            registry,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn selector(&self) -> &RuntimeSelector {
        &self.selector
    }

    /// Start a run, cancelling whatever run the conversation already has.
    ///
    /// Never fails: problems surface as a terminal `Error` on the handle's
    /// events. The new run claims the conversation's slot on the first poll,
    /// before the runtime is resolved, so the latest submission always wins.
    /// Dropping the future before it completes gives the slot back.
    pub async fn submit(&self, request: RunRequest) -> RunHandle {
        let conversation_id = request.conversation_id().to_string();
        let operation = request.operation();
        let run_id = RunId::new();
        let token = CancellationToken::new();

        let claim = self.install(&conversation_id, run_id, token.clone());

        let runtime = self.selector.resolve(&conversation_id).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RunHandle {
            run_id,
            conversation_id: conversation_id.clone(),
            runtime,
            events: EventReceiver::new(rx),
        };

        let current = match lock(&self.slots).get_mut(&conversation_id) {
            Some(slot) if slot.run_id == run_id && !token.is_cancelled() => {
                slot.runtime = Some(runtime);
                true
            }
            _ => false,
        };
        if !current {
            // Superseded while resolving; the sender drops and the handle sees nothing
            tracing::debug!(
                conversation_id = %conversation_id,
                run_id = %run_id,
                "Run superseded before it started"
            );
            return handle;
        }

        let stream = self.start(request, runtime, token.clone());
        metrics::record_run_started(runtime, operation.as_str());

        let span = tracing::info_span!(
            "run",
            conversation_id = %conversation_id,
            run_id = %run_id,
            runtime = %runtime,
            operation = %operation,
        );
        let forwarder = Forwarder {
            slots: Arc::clone(&self.slots),
            conversation_id,
            run_id,
            token,
            tx,
        };
        tokio::spawn(forwarder.run(stream).instrument(span));
        claim.hand_off();

        handle
    }

    /// Claim the slot, cancelling and discarding any previous run.
    ///
    /// The claim releases the slot if it is dropped before `hand_off`.
    fn install(&self, conversation_id: &str, run_id: RunId, token: CancellationToken) -> SlotClaim {
        let mut slots = lock(&self.slots);
        let previous = slots.insert(
            conversation_id.to_string(),
            RunSlot {
                run_id,
                runtime: None,
                token,
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            metrics::record_run_superseded();
            tracing::info!(
                conversation_id = %conversation_id,
                superseded = %previous.run_id,
                run_id = %run_id,
                "Superseding active run"
            );
        }
        metrics::set_active_runs(slots.len());

        SlotClaim {
            slots: Arc::clone(&self.slots),
            conversation_id: conversation_id.to_string(),
            run_id,
            armed: true,
        }
    }

    fn start(
        &self,
        request: RunRequest,
        runtime: RuntimeKind,
        token: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        let backend = match self.registry.get(runtime) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(runtime = %runtime, error = %e, "No backend for resolved runtime");
                return single(StreamEvent::error(e.to_string()), token);
            }
        };
        match request {
            RunRequest::Turn(input) => backend.begin(input, token),
            RunRequest::Resume(args) => backend.continue_from_checkpoint(args, token),
            RunRequest::Interrupt(args) => backend.respond_to_interrupt(args, token),
        }
    }

    /// Cancel the conversation's run. Returns false when it was already idle.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.remove(conversation_id) else {
            return false;
        };
        slot.token.cancel();
        metrics::record_run_cancelled();
        metrics::set_active_runs(slots.len());
        tracing::info!(conversation_id = %conversation_id, run_id = %slot.run_id, "Run cancelled");
        true
    }

    /// Cancel every run; used when the consumer surface goes away
    pub fn cancel_all(&self) -> usize {
        let mut slots = lock(&self.slots);
        let count = slots.len();
        for (conversation_id, slot) in slots.drain() {
            slot.token.cancel();
            metrics::record_run_cancelled();
            tracing::debug!(conversation_id = %conversation_id, run_id = %slot.run_id, "Run cancelled");
        }
        metrics::set_active_runs(0);
        if count > 0 {
            tracing::info!(count, "Cancelled all active runs");
        }
        count
    }

    pub fn state(&self, conversation_id: &str) -> RunState {
        match lock(&self.slots).get(conversation_id) {
            Some(slot) => RunState::Running {
                run_id: slot.run_id,
                runtime: slot.runtime,
            },
            None => RunState::Idle,
        }
    }

    /// Number of conversations with a running run
    pub fn active_runs(&self) -> usize {
        lock(&self.slots).len()
    }
}

/// A slot claimed by `submit` whose forwarder has not been spawned yet
struct SlotClaim {
    slots: Slots,
    conversation_id: String,
    run_id: RunId,
    armed: bool,
}

impl SlotClaim {
    /// The forwarder owns the slot from here on
    fn hand_off(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = lock(&self.slots);
        let owned = slots
            .get(&self.conversation_id)
            .is_some_and(|slot| slot.run_id == self.run_id);
        if !owned {
            return;
        }
        if let Some(slot) = slots.remove(&self.conversation_id) {
            slot.token.cancel();
        }
        metrics::set_active_runs(slots.len());
        tracing::debug!(
            conversation_id = %self.conversation_id,
            run_id = %self.run_id,
            "Submission dropped before the run started; releasing slot"
        );
    }
}

/// Moves one run's events from its backend stream to the consumer
struct Forwarder {
    slots: Slots,
    conversation_id: String,
    run_id: RunId,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl Forwarder {
    async fn run(self, mut stream: BoxStream<'static, StreamEvent>) {
        let started = Instant::now();

        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            let tag = event.tag();
            if !self.deliver(event, terminal) {
                return;
            }
            if terminal {
                metrics::record_run_finished(tag, started.elapsed());
                tracing::info!(outcome = tag, "Run finished");
                return;
            }
        }

        // Stream ended without a terminal event; silence is only legitimate after cancellation
        if self.deliver(StreamEvent::error(UNTERMINATED_STREAM), true) {
            metrics::record_run_finished("error", started.elapsed());
            tracing::warn!("Backend stream ended without a terminal event");
        }
    }

    /// Send one event if this run still owns the slot. A terminal event frees the slot.
    /// Returns false once the run is no longer deliverable.
    fn deliver(&self, event: StreamEvent, terminal: bool) -> bool {
        let mut slots = lock(&self.slots);
        let current = slots
            .get(&self.conversation_id)
            .is_some_and(|slot| slot.run_id == self.run_id);
        if !current || self.token.is_cancelled() {
            tracing::debug!("Run no longer current; dropping remaining events");
            return false;
        }

        let sent = self.tx.send(event).is_ok();
        if terminal || !sent {
            slots.remove(&self.conversation_id);
            metrics::set_active_runs(slots.len());
        }
        if !sent {
            // Nobody is listening any more, which is the same as a cancel
            self.token.cancel();
            metrics::record_run_cancelled();
            tracing::info!("Event receiver dropped; cancelling run");
        }
        sent
    }
}
