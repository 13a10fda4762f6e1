// ABOUTME: Graph-checkpoint backend - drives a checkpointed execution graph resumed via commands.
// ABOUTME: Multiplexes token-level and full-state chunks; pauses surface as interrupt markers in state.

use crate::command::{InterruptArgs, Operation, ResumeArgs, RuntimeKind, TurnInput};
use crate::error::{classify_failure, RunFailure};
use crate::event::{HitlDecision, StreamEvent, UpdateMode};
use crate::guard::{guard, single};
use crate::identity::SessionIdentityStore;
use crate::traits::RuntimeBackend;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One chunk of graph output, tagged with the stream mode that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct GraphChunk {
    pub mode: UpdateMode,
    pub payload: Value,
}

/// What to feed the graph on the next run
#[derive(Debug, Clone, PartialEq)]
pub enum GraphInput {
    /// New messages appended to the graph's message state
    Messages(Vec<Value>),
    /// Continue from the last checkpoint with no new input
    Continue,
    /// Structured command: resume value for the pending interrupt and/or a state update
    Command {
        resume: Option<Value>,
        update: Option<Value>,
    },
}

/// Per-run settings passed through to the graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRunConfig {
    pub working_directory: PathBuf,
    pub model_id: Option<String>,
}

/// Native checkpointed graph engine
#[async_trait]
pub trait CheckpointGraph: Send + Sync {
    /// Allocate a new checkpoint thread
    async fn create_thread(&self) -> Result<String>;

    /// Run the graph on a thread, streaming `messages` and `values` chunks
    async fn stream(
        &self,
        thread_id: &str,
        input: GraphInput,
        config: GraphRunConfig,
    ) -> Result<BoxStream<'static, Result<GraphChunk>>>;
}

/// Backend over a [`CheckpointGraph`]
#[derive(Clone)]
pub struct GraphCheckpointBackend {
    graph: Arc<dyn CheckpointGraph>,
    identities: SessionIdentityStore,
}

const KIND: RuntimeKind = RuntimeKind::GraphCheckpoint;

impl GraphCheckpointBackend {
    pub fn new(graph: Arc<dyn CheckpointGraph>, identities: SessionIdentityStore) -> Self {
        Self { graph, identities }
    }

    /// Stream one graph run on an existing or newly created thread
    fn run(
        self,
        conversation_id: String,
        input: GraphInput,
        config: GraphRunConfig,
        create_if_missing: bool,
        token: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let thread_id = match self.identities.get(&conversation_id, KIND).await {
                Some(id) => id,
                None if create_if_missing => match self.graph.create_thread().await {
                    Ok(id) => {
                        self.identities.record(&conversation_id, KIND, &id).await;
                        id
                    }
                    Err(e) => {
                        if let Some(event) = classify_failure(&e, &token).into_event() {
                            yield event;
                        }
                        return;
                    }
                },
                None => {
                    let failure = RunFailure::MissingSession {
                        runtime: KIND,
                        conversation_id: conversation_id.clone(),
                    };
                    if let Some(event) = failure.into_event() {
                        yield event;
                    }
                    return;
                }
            };

            tracing::debug!(
                conversation_id = %conversation_id,
                thread_id = %thread_id,
                "Starting graph run"
            );

            let mut chunks = match self.graph.stream(&thread_id, input, config).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    if let Some(event) = classify_failure(&e, &token).into_event() {
                        yield event;
                    }
                    return;
                }
            };

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        let event = StreamEvent::StateUpdate {
                            mode: chunk.mode,
                            state: chunk.payload,
                        };
                        let pending = event.pending_interrupt();
                        if !pending.is_empty() {
                            tracing::info!(
                                conversation_id = %conversation_id,
                                actions = ?pending.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                                "Graph paused on interrupt"
                            );
                        }
                        yield event;
                    }
                    Err(e) => {
                        if let Some(event) = classify_failure(&e, &token).into_event() {
                            yield event;
                        }
                        return;
                    }
                }
            }

            yield StreamEvent::Done;
        }
    }
}

/// Resume command carrying the decision list
fn resume_command(payload: Value) -> GraphInput {
    let decisions = match payload {
        Value::Array(items) => Value::Array(items),
        other => json!([other]),
    };
    GraphInput::Command {
        resume: Some(json!({ "decisions": decisions })),
        update: None,
    }
}

impl RuntimeBackend for GraphCheckpointBackend {
    fn kind(&self) -> RuntimeKind {
        KIND
    }

    fn begin(&self, input: TurnInput, cancel: CancellationToken) -> BoxStream<'static, StreamEvent> {
        let graph_input = GraphInput::Messages(vec![json!({
            "role": "user",
            "content": input.message,
        })]);
        let config = GraphRunConfig {
            working_directory: input.working_directory,
            model_id: input.model_id,
        };
        let events = self.clone().run(
            input.conversation_id,
            graph_input,
            config,
            true,
            cancel.clone(),
        );
        guard(events, cancel)
    }

    fn continue_from_checkpoint(
        &self,
        args: ResumeArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        let config = GraphRunConfig {
            working_directory: args.working_directory,
            model_id: None,
        };
        let events = self.clone().run(
            args.conversation_id,
            resume_command(args.payload),
            config,
            false,
            cancel.clone(),
        );
        guard(events, cancel)
    }

    fn respond_to_interrupt(
        &self,
        args: InterruptArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        let input = match args.decision {
            HitlDecision::Reject => {
                tracing::info!(
                    conversation_id = %args.conversation_id,
                    operation = %Operation::RespondToInterrupt,
                    "Pending action rejected; ending run without continuation"
                );
                return single(StreamEvent::Done, cancel);
            }
            HitlDecision::Approve => GraphInput::Continue,
            HitlDecision::Edit { args: edited } => GraphInput::Command {
                resume: None,
                update: Some(json!({ "editedAction": edited })),
            },
        };
        let config = GraphRunConfig {
            working_directory: args.working_directory,
            model_id: None,
        };
        let events = self
            .clone()
            .run(args.conversation_id, input, config, false, cancel.clone());
        guard(events, cancel)
    }
}
