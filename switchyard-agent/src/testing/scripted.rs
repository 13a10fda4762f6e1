// ABOUTME: Scripted native clients that replay canned outputs and record what they were asked.
// ABOUTME: Scripts can fail mid-stream or hang until the run is cancelled.

use crate::approval::PermissionDecision;
use crate::backends::graph_checkpoint::{CheckpointGraph, GraphChunk, GraphInput, GraphRunConfig};
use crate::backends::session_resumable::{ChatMessage, ChatRequest, ChatSessionClient, PermissionCallback};
use crate::backends::thread_based::{ThreadClient, ThreadItem, ThreadTurn};
use crate::conversation::{Conversation, InMemoryConversationStore};
use crate::event::StreamEvent;
use crate::identity::SessionIdentityStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// One step of a scripted native stream
#[derive(Debug, Clone)]
pub enum Step<T> {
    Emit(T),
    /// Yield an error item and end
    Fail(String),
    /// Stay pending forever, as a transport waiting on the network would
    Hang,
}

fn play<T: Send + 'static>(steps: Vec<Step<T>>) -> BoxStream<'static, Result<T>> {
    let mut items = Vec::new();
    let mut hang = false;
    for step in steps {
        match step {
            Step::Emit(item) => items.push(Ok(item)),
            Step::Fail(message) => {
                items.push(Err(anyhow!(message)));
                break;
            }
            Step::Hang => {
                hang = true;
                break;
            }
        }
    }
    let head = stream::iter(items);
    if hang {
        Box::pin(head.chain(stream::pending()))
    } else {
        Box::pin(head)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drain a backend stream
pub async fn collect_events(events: BoxStream<'static, StreamEvent>) -> Vec<StreamEvent> {
    events.collect().await
}

/// In-memory store holding one conversation, plus an identity store over it
pub fn memory_store(conversation_id: &str) -> (Arc<InMemoryConversationStore>, SessionIdentityStore) {
    let store = Arc::new(InMemoryConversationStore::new());
    store.insert(Conversation::new(conversation_id, std::env::temp_dir()));
    let identities = SessionIdentityStore::new(store.clone());
    (store, identities)
}

/// Checkpoint graph replaying one script per run
#[derive(Default)]
pub struct ScriptedGraph {
    runs: Mutex<VecDeque<Vec<Step<GraphChunk>>>>,
    calls: Mutex<Vec<(String, GraphInput)>>,
    threads_created: Mutex<usize>,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_run(&self, steps: Vec<Step<GraphChunk>>) -> &Self {
        lock(&self.runs).push_back(steps);
        self
    }

    /// (thread id, input) for every streamed run
    pub fn calls(&self) -> Vec<(String, GraphInput)> {
        lock(&self.calls).clone()
    }

    pub fn threads_created(&self) -> usize {
        *lock(&self.threads_created)
    }
}

#[async_trait]
impl CheckpointGraph for ScriptedGraph {
    async fn create_thread(&self) -> Result<String> {
        let mut created = lock(&self.threads_created);
        *created += 1;
        Ok(format!("thread-{}", *created))
    }

    async fn stream(
        &self,
        thread_id: &str,
        input: GraphInput,
        _config: GraphRunConfig,
    ) -> Result<BoxStream<'static, Result<GraphChunk>>> {
        lock(&self.calls).push((thread_id.to_string(), input));
        let steps = lock(&self.runs)
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted graph run left"))?;
        Ok(play(steps))
    }
}

/// One step of a scripted chat exchange
#[derive(Debug, Clone)]
pub enum ChatStep {
    Message(ChatMessage),
    /// Invoke the permission callback and wait for its answer
    AskPermission { tool_name: String, input: Value },
    Fail(String),
    Hang,
}

/// Session-resumable chat API replaying one script per exchange
#[derive(Default)]
pub struct ScriptedChatClient {
    exchanges: Mutex<VecDeque<Vec<ChatStep>>>,
    requests: Mutex<Vec<ChatRequest>>,
    decisions: Arc<Mutex<Vec<PermissionDecision>>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_exchange(&self, steps: Vec<ChatStep>) -> &Self {
        lock(&self.exchanges).push_back(steps);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    /// Answers the permission callback gave, in order
    pub fn decisions(&self) -> Vec<PermissionDecision> {
        lock(&self.decisions).clone()
    }
}

#[async_trait]
impl ChatSessionClient for ScriptedChatClient {
    async fn query(
        &self,
        request: ChatRequest,
        permissions: Arc<dyn PermissionCallback>,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ChatMessage>>> {
        lock(&self.requests).push(request);
        let steps = lock(&self.exchanges)
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted chat exchange left"))?;
        let decisions = Arc::clone(&self.decisions);

        let messages = async_stream::stream! {
            for step in steps {
                match step {
                    ChatStep::Message(message) => yield Ok(message),
                    ChatStep::AskPermission { tool_name, input } => {
                        let decision = permissions.can_use_tool(&tool_name, &input).await;
                        lock(&decisions).push(decision);
                    }
                    ChatStep::Fail(message) => {
                        yield Err(anyhow!(message));
                        return;
                    }
                    ChatStep::Hang => {
                        futures::future::pending::<()>().await;
                    }
                }
            }
        };
        Ok(Box::pin(messages))
    }
}

/// Thread API replaying one script per turn
#[derive(Default)]
pub struct ScriptedThreadClient {
    turns: Mutex<VecDeque<Vec<Step<ThreadItem>>>>,
    requests: Mutex<Vec<ThreadTurn>>,
}

impl ScriptedThreadClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&self, steps: Vec<Step<ThreadItem>>) -> &Self {
        lock(&self.turns).push_back(steps);
        self
    }

    pub fn requests(&self) -> Vec<ThreadTurn> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ThreadClient for ScriptedThreadClient {
    async fn run_turn(
        &self,
        turn: ThreadTurn,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ThreadItem>>> {
        lock(&self.requests).push(turn);
        let steps = lock(&self.turns)
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted thread turn left"))?;
        Ok(play(steps))
    }
}
