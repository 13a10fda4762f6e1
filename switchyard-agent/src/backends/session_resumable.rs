// ABOUTME: Session-resumable backend - single-exchange chat turns resumed by session id.
// ABOUTME: Pauses in-process through a blocking tool-permission callback; approvals start a new turn.

use crate::approval::{ApprovalSurface, PermissionDecision, ToolPermissionRequest};
use crate::command::{InterruptArgs, ResumeArgs, RuntimeKind, TurnInput};
use crate::error::{classify_failure, classify_message, RunFailure};
use crate::event::{HitlDecision, StreamEvent};
use crate::guard::{guard, single};
use crate::identity::SessionIdentityStore;
use crate::traits::RuntimeBackend;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Messages produced by the native chat call
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    /// The backend revealed (or confirmed) the session id for this exchange
    SessionStarted { session_id: String },
    /// A chunk of assistant text
    AssistantText { message_id: String, text: String },
    /// The exchange finished successfully
    Completed,
    /// The exchange failed
    Failed { message: String },
}

/// One chat exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    /// Session to resume; `None` starts fresh
    pub session_id: Option<String>,
    pub working_directory: PathBuf,
    pub model_id: Option<String>,
}

/// Invoked by the native backend itself before it runs a tool
#[async_trait]
pub trait PermissionCallback: Send + Sync {
    async fn can_use_tool(&self, tool_name: &str, input: &Value) -> PermissionDecision;
}

/// Native session-resumable chat API
#[async_trait]
pub trait ChatSessionClient: Send + Sync {
    async fn query(
        &self,
        request: ChatRequest,
        permissions: Arc<dyn PermissionCallback>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ChatMessage>>>;
}

/// Routes permission requests to the approval surface, denying once the run is cancelled
struct SurfacePermission {
    conversation_id: String,
    approval: Arc<dyn ApprovalSurface>,
    cancel: CancellationToken,
}

#[async_trait]
impl PermissionCallback for SurfacePermission {
    async fn can_use_tool(&self, tool_name: &str, input: &Value) -> PermissionDecision {
        tracing::info!(
            conversation_id = %self.conversation_id,
            tool = %tool_name,
            "Waiting for tool permission"
        );
        let request = ToolPermissionRequest {
            conversation_id: self.conversation_id.clone(),
            tool_name: tool_name.to_string(),
            input: input.clone(),
        };
        tokio::select! {
            _ = self.cancel.cancelled() => PermissionDecision::deny("run cancelled"),
            decision = self.approval.request_tool_permission(request) => decision,
        }
    }
}

const KIND: RuntimeKind = RuntimeKind::SessionResumable;

const PROCEED_INSTRUCTION: &str = "The user approved the pending action. Proceed with it.";

/// Backend over a [`ChatSessionClient`]
#[derive(Clone)]
pub struct SessionResumableBackend {
    client: Arc<dyn ChatSessionClient>,
    identities: SessionIdentityStore,
    approval: Arc<dyn ApprovalSurface>,
}

impl SessionResumableBackend {
    pub fn new(
        client: Arc<dyn ChatSessionClient>,
        identities: SessionIdentityStore,
        approval: Arc<dyn ApprovalSurface>,
    ) -> Self {
        Self {
            client,
            identities,
            approval,
        }
    }

    /// Issue one chat exchange and translate its messages into stream events
    fn exchange(
        self,
        conversation_id: String,
        prompt: String,
        working_directory: PathBuf,
        model_id: Option<String>,
        require_session: bool,
        token: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let known_session = self.identities.get(&conversation_id, KIND).await;
            if require_session && known_session.is_none() {
                let failure = RunFailure::MissingSession {
                    runtime: KIND,
                    conversation_id: conversation_id.clone(),
                };
                if let Some(event) = failure.into_event() {
                    yield event;
                }
                return;
            }

            let request = ChatRequest {
                prompt,
                session_id: known_session.clone(),
                working_directory,
                model_id,
            };
            let permissions: Arc<dyn PermissionCallback> = Arc::new(SurfacePermission {
                conversation_id: conversation_id.clone(),
                approval: Arc::clone(&self.approval),
                cancel: token.clone(),
            });

            let mut messages = match self.client.query(request, permissions, token.clone()).await {
                Ok(messages) => messages,
                Err(e) => {
                    if let Some(event) = classify_failure(&e, &token).into_event() {
                        yield event;
                    }
                    return;
                }
            };

            let mut recorded = known_session;
            while let Some(message) = messages.next().await {
                match message {
                    Ok(ChatMessage::SessionStarted { session_id }) => {
                        if recorded.is_none() {
                            self.identities.record(&conversation_id, KIND, &session_id).await;
                            recorded = Some(session_id);
                        } else if recorded.as_deref() != Some(session_id.as_str()) {
                            tracing::warn!(
                                conversation_id = %conversation_id,
                                stored = ?recorded,
                                reported = %session_id,
                                "Chat reported a different session id; keeping the stored one"
                            );
                        }
                    }
                    Ok(ChatMessage::AssistantText { message_id, text }) => {
                        if !text.is_empty() {
                            yield StreamEvent::Token { message_id, text };
                        }
                    }
                    Ok(ChatMessage::Completed) => {
                        yield StreamEvent::Done;
                        return;
                    }
                    Ok(ChatMessage::Failed { message }) => {
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
                classify_message("chat session ended without a result".to_string(), &token).into_event()
            {
                yield event;
            }
        }
    }
}

/// Prompt for the follow-up turn after an approval
fn proceed_prompt(decision: &HitlDecision) -> Option<String> {
    match decision {
        HitlDecision::Reject => None,
        HitlDecision::Approve => Some(PROCEED_INSTRUCTION.to_string()),
        HitlDecision::Edit { args } => Some(format!(
            "The user approved the pending action with edited arguments. \
             Proceed using these arguments instead:\n{}",
            serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string())
        )),
    }
}

impl RuntimeBackend for SessionResumableBackend {
    fn kind(&self) -> RuntimeKind {
        KIND
    }

    fn begin(&self, input: TurnInput, cancel: CancellationToken) -> BoxStream<'static, StreamEvent> {
        let events = self.clone().exchange(
            input.conversation_id,
            input.message,
            input.working_directory,
            input.model_id,
            false,
            cancel.clone(),
        );
        guard(events, cancel)
    }

    fn continue_from_checkpoint(
        &self,
        args: ResumeArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        // No native checkpoint exists here; an out-of-band approval becomes a new turn
        let prompt = format!(
            "{}\nResume payload: {}",
            PROCEED_INSTRUCTION, args.payload
        );
        let events = self.clone().exchange(
            args.conversation_id,
            prompt,
            args.working_directory,
            None,
            true,
            cancel.clone(),
        );
        guard(events, cancel)
    }

    fn respond_to_interrupt(
        &self,
        args: InterruptArgs,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        let Some(prompt) = proceed_prompt(&args.decision) else {
            tracing::info!(
                conversation_id = %args.conversation_id,
                "Pending action rejected; ending run"
            );
            return single(StreamEvent::Done, cancel);
        };
        let events = self.clone().exchange(
            args.conversation_id,
            prompt,
            args.working_directory,
            None,
            true,
            cancel.clone(),
        );
        guard(events, cancel)
    }
}
