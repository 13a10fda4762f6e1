// ABOUTME: Terminal front end: stdin-backed approval prompts and event rendering.
// ABOUTME: Pauses from the session and thread runtimes are answered with y/N on the console.

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use switchyard_agent::{
    ApprovalSurface, PermissionDecision, StreamEvent, ToolPermissionRequest, TurnApprovalRequest,
    UpdateMode,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Asks on stderr, answers from stdin. EOF counts as "no".
pub struct TerminalApproval {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalApproval {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn confirm(&self, question: &str) -> bool {
        // One prompt at a time; concurrent runs queue behind the lock
        let mut lines = self.lines.lock().await;
        eprint!("{} [y/N] ", question);
        let _ = std::io::stderr().flush();
        match lines.next_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read approval from stdin");
                false
            }
        }
    }
}

impl Default for TerminalApproval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalSurface for TerminalApproval {
    async fn request_tool_permission(&self, request: ToolPermissionRequest) -> PermissionDecision {
        let question = format!(
            "\n[{}] allow tool {} with {}?",
            request.conversation_id,
            request.tool_name,
            compact(&request.input)
        );
        if self.confirm(&question).await {
            PermissionDecision::allow()
        } else {
            PermissionDecision::deny(format!("{} denied by user", request.tool_name))
        }
    }

    async fn request_turn_approval(&self, request: TurnApprovalRequest) -> bool {
        let question = format!(
            "\n[{}] allow writes in {} for this turn? (no = read-only)",
            request.conversation_id,
            request.working_directory.display()
        );
        self.confirm(&question).await
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn compact(value: &Value) -> String {
    const LIMIT: usize = 200;
    let text = value.to_string();
    if text.chars().count() > LIMIT {
        let truncated: String = text.chars().take(LIMIT).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

/// What one event should print, if anything
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Assistant text, written to stdout as-is
    Text(String),
    /// Run paused on a checkpoint with these action descriptions
    Paused(Vec<String>),
    Done,
    Failed(String),
}

pub fn render(event: &StreamEvent) -> Option<Rendered> {
    match event {
        StreamEvent::Token { text, .. } => Some(Rendered::Text(text.clone())),
        StreamEvent::StateUpdate {
            mode: UpdateMode::Messages,
            state,
        } => message_text(state).map(Rendered::Text),
        StreamEvent::StateUpdate {
            mode: UpdateMode::Values,
            ..
        } => {
            let pending = event.pending_interrupt();
            if pending.is_empty() {
                return None;
            }
            Some(Rendered::Paused(
                pending
                    .iter()
                    .map(|action| match &action.description {
                        Some(description) => format!("{} {} ({})", action.name, compact(&action.args), description),
                        None => format!("{} {}", action.name, compact(&action.args)),
                    })
                    .collect(),
            ))
        }
        StreamEvent::Done => Some(Rendered::Done),
        StreamEvent::Error { message } => Some(Rendered::Failed(message.clone())),
    }
}

/// Text content of a streamed graph message chunk (`[chunk, metadata]` or a bare chunk)
fn message_text(state: &Value) -> Option<String> {
    let chunk = match state {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match chunk.get("content")? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}
