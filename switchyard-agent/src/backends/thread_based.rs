// ABOUTME: Thread-based backend - turn-oriented thread API with a sandbox policy fixed before the turn.
// ABOUTME: Asks one upfront allow/deny question; resume and interrupt are unsupported and end in an error event.

use crate::approval::{ApprovalSurface, TurnApprovalRequest};
use crate::command::{InterruptArgs, Operation, ResumeArgs, RuntimeKind, TurnInput};
use crate::error::{classify_failure, classify_message, RunFailure};
use crate::event::StreamEvent;
use crate::guard::{guard, single};
use crate::identity::SessionIdentityStore;
use crate::traits::RuntimeBackend;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Declarative sandbox applied to the whole turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxPolicy {
    ReadOnly,
    WorkspaceWrite,
}

impl SandboxPolicy {
    /// Translate the upfront gate's answer
    pub fn from_approval(approved: bool) -> Self {
        if approved {
            Self::WorkspaceWrite
        } else {
            Self::ReadOnly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
        }
    }
}

impl fmt::Display for SandboxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn on a thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadTurn {
    /// Thread to resume; `None` starts a new thread
    pub thread_id: Option<String>,
    pub prompt: String,
    pub working_directory: PathBuf,
    pub sandbox: SandboxPolicy,
    pub model_id: Option<String>,
}

/// Items produced by the native thread API
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadItem {
    ThreadStarted { thread_id: String },
    /// A completed assistant output item
    AgentMessage { item_id: String, text: String },
    TurnCompleted,
    TurnFailed { message: String },
}

/// Native thread-based turn API
#[async_trait]
pub trait ThreadClient: Send + Sync {
    async fn run_turn(
        &self,
        turn: ThreadTurn,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ThreadItem>>>;
}

const KIND: RuntimeKind = RuntimeKind::ThreadBased;

/// Backend over a [`ThreadClient`]
#[derive(Clone)]
pub struct ThreadBasedBackend {
    client: Arc<dyn ThreadClient>,
    identities: SessionIdentityStore,
    approval: Arc<dyn ApprovalSurface>,
}

impl ThreadBasedBackend {
    pub fn new(
        client: Arc<dyn ThreadClient>,
        identities: SessionIdentityStore,
        approval: Arc<dyn ApprovalSurface>,
    ) -> Self {
        Self {
            client,
            identities,
            approval,
        }
    }

    fn turn(self, input: TurnInput, token: CancellationToken) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            // The input channel closes once the turn starts, so ask before anything runs
            let request = TurnApprovalRequest {
                conversation_id: input.conversation_id.clone(),
                message: input.message.clone(),
                working_directory: input.working_directory.clone(),
            };
            let approved = tokio::select! {
                _ = token.cancelled() => return,
                approved = self.approval.request_turn_approval(request) => approved,
            };
            let sandbox = SandboxPolicy::from_approval(approved);
            tracing::info!(
                conversation_id = %input.conversation_id,
                sandbox = %sandbox,
                "Upfront approval resolved"
            );

            let known_thread = self.identities.get(&input.conversation_id, KIND).await;
            let turn = ThreadTurn {
                thread_id: known_thread.clone(),
                prompt: input.message,
                working_directory: input.working_directory,
                sandbox,
                model_id: input.model_id,
            };

            let mut items = match self.client.run_turn(turn, token.clone()).await {
                Ok(items) => items,
                Err(e) => {
                    if let Some(event) = classify_failure(&e, &token).into_event() {
                        yield event;
                    }
                    return;
                }
            };

            let mut recorded = known_thread;
            while let Some(item) = items.next().await {
                match item {
                    Ok(ThreadItem::ThreadStarted { thread_id }) => {
                        if recorded.is_none() {
                            self.identities
                                .record(&input.conversation_id, KIND, &thread_id)
                                .await;
                            recorded = Some(thread_id);
                        } else if recorded.as_deref() != Some(thread_id.as_str()) {
                            tracing::warn!(
                                conversation_id = %input.conversation_id,
                                stored = ?recorded,
                                reported = %thread_id,
                                "Thread API reported a different thread id; keeping the stored one"
                            );
                        }
                    }
                    Ok(ThreadItem::AgentMessage { item_id, text }) => {
                        if !text.is_empty() {
                            yield StreamEvent::Token { message_id: item_id, text };
                        }
                    }
                    Ok(ThreadItem::TurnCompleted) => {
                        yield StreamEvent::Done;
                        return;
                    }
                    Ok(ThreadItem::TurnFailed { message }) => {
                        if let Some(event) = classify_message(message, &token).into_event() {
                            yield event;
                        }
                        return;
                    }
                    Err(e) => {
                        if let Some(event) = classify_failure(&e, &token).into_event() {
                            yield event;
                        }
                        return;
                    }
                }
            }

            if let Some(event) =
                classify_message("thread turn ended without completing".to_string(), &token).into_event()
            {
                yield event;
            }
        }
    }

    fn unsupported(&self, operation: Operation, cancel: CancellationToken) -> BoxStream<'static, StreamEvent> {
        let failure = RunFailure::Unsupported {
            runtime: KIND,
            operation,
        };
        tracing::warn!(operation = %operation, "{failure}");
        single(StreamEvent::error(failure.to_string()), cancel)
    }
}

impl RuntimeBackend for ThreadBasedBackend {
    fn kind(&self) -> RuntimeKind {
        KIND
    }

    fn begin(&self, input: TurnInput, cancel: CancellationToken) -> BoxStream<'static, StreamEvent> {
        let events = self.clone().turn(input, cancel.clone());
        guard(events, cancel)
    }

    fn continue_from_checkpoint(
        &self,
        _args: ResumeArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        self.unsupported(Operation::ContinueFromCheckpoint, cancel)
    }

    fn respond_to_interrupt(
        &self,
        _args: InterruptArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        self.unsupported(Operation::RespondToInterrupt, cancel)
    }
}
