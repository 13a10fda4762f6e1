// ABOUTME: Session-resumable chat client over the Claude CLI in bidirectional stream-json mode.
// ABOUTME: Answers can_use_tool control requests on stdin so the CLI blocks on the approval surface.

use crate::approval::PermissionDecision;
use crate::backends::session_resumable::{ChatMessage, ChatRequest, ChatSessionClient, PermissionCallback};
use crate::backends::spawn_stderr_logger;
use crate::config::SessionConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command as ProcessCommand};
use tokio_util::sync::CancellationToken;

/// One parsed stdout line from the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum CliLine {
    Message(ChatMessage),
    /// The CLI is blocked until we answer this request
    PermissionRequest {
        request_id: String,
        tool_name: String,
        input: Value,
    },
}

pub struct ClaudeCliClient {
    config: SessionConfig,
}

impl ClaudeCliClient {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    fn args(&self, request: &ChatRequest) -> Vec<String> {
        let mut args: Vec<String> = [
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
            "--permission-prompt-tool",
            "stdio",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(session_id) = &request.session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(model) = request.model_id.as_ref().or(self.config.model.as_ref()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl ChatSessionClient for ClaudeCliClient {
    async fn query(
        &self,
        request: ChatRequest,
        permissions: Arc<dyn PermissionCallback>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ChatMessage>>> {
        let args = self.args(&request);
        tracing::debug!(?args, resume = request.session_id.is_some(), "Spawning Claude CLI");

        let mut child = ProcessCommand::new(&self.config.binary)
            .args(&args)
            .current_dir(&request.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn Claude CLI '{}'", self.config.binary))?;

        let mut stdin = child.stdin.take().context("Failed to capture stdin")?;
        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        spawn_stderr_logger(stderr, "Claude CLI");

        write_line(&mut stdin, &user_message(&request.prompt)).await?;

        let messages = async_stream::stream! {
            let mut child = child;
            let mut stdin = Some(stdin);
            let mut lines = BufReader::new(stdout).lines();

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    line = lines.next_line() => Some(line),
                };
                let line = match next {
                    None => {
                        tracing::debug!("Cancelled; killing Claude CLI");
                        if let Err(e) = child.start_kill() {
                            tracing::debug!(error = %e, "Claude CLI already exited");
                        }
                        return;
                    }
                    Some(Ok(Some(line))) => line,
                    Some(Ok(None)) => break,
                    Some(Err(e)) => {
                        yield Err(anyhow::Error::new(e).context("Failed to read Claude CLI output"));
                        return;
                    }
                };

                match parse_cli_line(&line) {
                    Some(CliLine::Message(message)) => {
                        let terminal = matches!(
                            message,
                            ChatMessage::Completed | ChatMessage::Failed { .. }
                        );
                        yield Ok(message);
                        if terminal {
                            // Closing stdin lets the CLI exit after its result
                            stdin.take();
                            break;
                        }
                    }
                    Some(CliLine::PermissionRequest { request_id, tool_name, input }) => {
                        let decision = permissions.can_use_tool(&tool_name, &input).await;
                        tracing::debug!(
                            tool = %tool_name,
                            allowed = decision.is_allowed(),
                            "Answering tool permission request"
                        );
                        if let Some(writer) = stdin.as_mut() {
                            let response = control_response(&request_id, &decision, &input);
                            if let Err(e) = write_line(writer, &response).await {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                    None => {}
                }
            }

            drop(stdin);
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(code = ?status.code(), "Claude CLI exited with failure status");
                }
                Err(e) => tracing::warn!(error = %e, "Failed to wait for Claude CLI"),
                _ => {}
            }
        };

        Ok(Box::pin(messages))
    }
}

async fn write_line(stdin: &mut ChildStdin, value: &Value) -> Result<()> {
    let mut line = serde_json::to_string(value).context("Failed to encode stdin message")?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .context("Failed to write to Claude CLI stdin")?;
    stdin.flush().await.context("Failed to flush Claude CLI stdin")
}

/// The user turn, in stream-json input format
pub fn user_message(prompt: &str) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": prompt }],
        },
    })
}

/// Reply to a `can_use_tool` control request
pub fn control_response(request_id: &str, decision: &PermissionDecision, original_input: &Value) -> Value {
    let body = match decision {
        PermissionDecision::Allow { updated_input } => json!({
            "behavior": "allow",
            "updatedInput": updated_input.clone().unwrap_or_else(|| original_input.clone()),
        }),
        PermissionDecision::Deny { message } => json!({
            "behavior": "deny",
            "message": message,
        }),
    };
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": body,
        },
    })
}

/// Parse one line of CLI output; `None` for lines we do not act on
pub fn parse_cli_line(line: &str) -> Option<CliLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let json: Value = match serde_json::from_str(line) {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!(error = %e, line = %line, "Skipping non-JSON CLI output");
            return None;
        }
    };

    match json.get("type").and_then(|t| t.as_str())? {
        "system" => {
            if json.get("subtype").and_then(|s| s.as_str()) != Some("init") {
                return None;
            }
            let session_id = json.get("session_id").and_then(|s| s.as_str())?;
            Some(CliLine::Message(ChatMessage::SessionStarted {
                session_id: session_id.to_string(),
            }))
        }
        "assistant" => {
            let message = json.get("message")?;
            let text: String = message
                .get("content")
                .and_then(|c| c.as_array())?
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.is_empty() {
                return None;
            }
            let message_id = message
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or("assistant")
                .to_string();
            Some(CliLine::Message(ChatMessage::AssistantText { message_id, text }))
        }
        "result" => {
            let is_error = json.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
            if !is_error {
                return Some(CliLine::Message(ChatMessage::Completed));
            }
            let message = json
                .get("error")
                .or_else(|| json.get("result"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .or_else(|| {
                    json.get("subtype")
                        .and_then(|s| s.as_str())
                        .map(|s| format!("Claude CLI failed: {}", s))
                })
                .unwrap_or_else(|| "Claude CLI failed".to_string());
            Some(CliLine::Message(ChatMessage::Failed { message }))
        }
        "control_request" => {
            let request_id = json.get("request_id").and_then(|r| r.as_str())?;
            let request = json.get("request")?;
            if request.get("subtype").and_then(|s| s.as_str()) != Some("can_use_tool") {
                tracing::debug!(request = %request, "Ignoring unsupported control request");
                return None;
            }
            Some(CliLine::PermissionRequest {
                request_id: request_id.to_string(),
                tool_name: request
                    .get("tool_name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                input: request.get("input").cloned().unwrap_or(Value::Null),
            })
        }
        _ => None,
    }
}
