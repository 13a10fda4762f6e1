// ABOUTME: Thread-based client over `codex exec --json`, one process per turn.
// ABOUTME: The sandbox flag is fixed at spawn time; JSONL items map onto thread items.

use crate::backends::spawn_stderr_logger;
use crate::backends::thread_based::{ThreadClient, ThreadItem, ThreadTurn};
use crate::config::ThreadConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio_util::sync::CancellationToken;

pub struct CodexCliClient {
    config: ThreadConfig,
}

impl CodexCliClient {
    pub fn new(config: ThreadConfig) -> Self {
        Self { config }
    }

    fn args(&self, turn: &ThreadTurn) -> Vec<String> {
        // --json and -s must come before the `resume` subcommand
        let mut args = vec![
            "exec".to_string(),
            "--json".to_string(),
            "-s".to_string(),
            turn.sandbox.as_str().to_string(),
        ];
        if let Some(model) = turn.model_id.as_ref().or(self.config.model.as_ref()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(self.config.extra_args.iter().cloned());

        match &turn.thread_id {
            Some(thread_id) => {
                args.push("resume".to_string());
                args.push(thread_id.clone());
            }
            None => {
                args.push("-C".to_string());
                args.push(turn.working_directory.display().to_string());
            }
        }
        args.push(turn.prompt.clone());
        args
    }
}

#[async_trait]
impl ThreadClient for CodexCliClient {
    async fn run_turn(
        &self,
        turn: ThreadTurn,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ThreadItem>>> {
        let args = self.args(&turn);
        tracing::debug!(?args, sandbox = %turn.sandbox, "Spawning Codex CLI");

        let mut child = ProcessCommand::new(&self.config.binary)
            .args(&args)
            .current_dir(&turn.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn Codex CLI '{}'", self.config.binary))?;

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        spawn_stderr_logger(stderr, "Codex CLI");

        let items = async_stream::stream! {
            let mut child = child;
            let mut lines = BufReader::new(stdout).lines();

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    line = lines.next_line() => Some(line),
                };
                let line = match next {
                    None => {
                        tracing::debug!("Cancelled; killing Codex CLI");
                        if let Err(e) = child.start_kill() {
                            tracing::debug!(error = %e, "Codex CLI already exited");
                        }
                        return;
                    }
                    Some(Ok(Some(line))) => line,
                    Some(Ok(None)) => break,
                    Some(Err(e)) => {
                        yield Err(anyhow::Error::new(e).context("Failed to read Codex CLI output"));
                        return;
                    }
                };

                if let Some(item) = parse_codex_line(&line) {
                    let terminal = matches!(item, ThreadItem::TurnCompleted | ThreadItem::TurnFailed { .. });
                    yield Ok(item);
                    if terminal {
                        break;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    yield Err(anyhow::anyhow!("Codex exited with status: {:?}", status.code()));
                }
                Err(e) => tracing::warn!(error = %e, "Failed to wait for Codex CLI"),
                _ => {}
            }
        };

        Ok(Box::pin(items))
    }
}

/// Parse one JSONL event; `None` for events that carry nothing we surface
pub fn parse_codex_line(line: &str) -> Option<ThreadItem> {
    let json: Value = serde_json::from_str(line.trim()).ok()?;

    match json.get("type").and_then(|t| t.as_str())? {
        "thread.started" => {
            let thread_id = json.get("thread_id").and_then(|t| t.as_str())?;
            Some(ThreadItem::ThreadStarted {
                thread_id: thread_id.to_string(),
            })
        }
        "item.completed" => {
            let item = json.get("item")?;
            let item_type = item
                .get("type")
                .or_else(|| item.get("item_type"))
                .and_then(|t| t.as_str())?;
            match item_type {
                "agent_message" | "assistant_message" => Some(ThreadItem::AgentMessage {
                    item_id: item
                        .get("id")
                        .and_then(|i| i.as_str())
                        .unwrap_or("agent_message")
                        .to_string(),
                    text: item.get("text").and_then(|t| t.as_str())?.to_string(),
                }),
                "error" => {
                    let message = item.get("message").and_then(|m| m.as_str())?;
                    // Advisory warnings arrive as error items
                    if message.contains("consider adding") {
                        tracing::debug!(%message, "Ignoring Codex advisory");
                        return None;
                    }
                    Some(ThreadItem::TurnFailed {
                        message: message.to_string(),
                    })
                }
                _ => None,
            }
        }
        "turn.completed" => Some(ThreadItem::TurnCompleted),
        "turn.failed" => {
            let message = json
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .unwrap_or("Codex turn failed")
                .to_string();
            Some(ThreadItem::TurnFailed { message })
        }
        "error" => Some(ThreadItem::TurnFailed {
            message: json
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Codex error")
                .to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::thread_based::SandboxPolicy;
    use std::path::PathBuf;

    fn turn(thread_id: Option<&str>, sandbox: SandboxPolicy) -> ThreadTurn {
        ThreadTurn {
            thread_id: thread_id.map(str::to_string),
            prompt: "fix it".into(),
            working_directory: PathBuf::from("/repo"),
            sandbox,
            model_id: None,
        }
    }

    #[test]
    fn test_args_new_thread() {
        let client = CodexCliClient::new(ThreadConfig::default());
        let args = client.args(&turn(None, SandboxPolicy::ReadOnly));
        assert_eq!(args, vec!["exec", "--json", "-s", "read-only", "-C", "/repo", "fix it"]);
    }

    #[test]
    fn test_args_resume_thread() {
        let client = CodexCliClient::new(ThreadConfig::default());
        let args = client.args(&turn(Some("t-1"), SandboxPolicy::WorkspaceWrite));
        assert_eq!(
            args,
            vec!["exec", "--json", "-s", "workspace-write", "resume", "t-1", "fix it"]
        );
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_codex_line(r#"{"type":"thread.started","thread_id":"t-9"}"#),
            Some(ThreadItem::ThreadStarted { thread_id: "t-9".into() })
        );
        assert_eq!(
            parse_codex_line(r#"{"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":"done"}}"#),
            Some(ThreadItem::AgentMessage {
                item_id: "item_1".into(),
                text: "done".into()
            })
        );
        assert_eq!(
            parse_codex_line(r#"{"type":"item.completed","item":{"id":"i2","type":"reasoning","text":"hmm"}}"#),
            None
        );
        assert_eq!(
            parse_codex_line(r#"{"type":"turn.completed","usage":{"input_tokens":1}}"#),
            Some(ThreadItem::TurnCompleted)
        );
        assert_eq!(
            parse_codex_line(r#"{"type":"turn.failed","error":{"message":"quota"}}"#),
            Some(ThreadItem::TurnFailed { message: "quota".into() })
        );
        assert_eq!(parse_codex_line("garbage"), None);
    }
}
