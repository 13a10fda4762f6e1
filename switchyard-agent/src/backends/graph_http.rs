// ABOUTME: HTTP client for a remote checkpointed graph server (threads + streamed runs over SSE).
// ABOUTME: Maps `messages*` SSE events to token-oriented chunks and `values` events to full-state chunks.

use crate::backends::graph_checkpoint::{CheckpointGraph, GraphChunk, GraphInput, GraphRunConfig};
use crate::config::GraphConfig;
use crate::event::UpdateMode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Graph server client
pub struct HttpGraphClient {
    http: reqwest::Client,
    base_url: String,
    assistant_id: String,
    api_key: Option<String>,
}

impl HttpGraphClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            anyhow::bail!("graph backend requires 'url' to be set");
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to build graph HTTP client")?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            assistant_id: config.assistant_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Request body for a streamed run
    fn run_body(&self, input: GraphInput, config: &GraphRunConfig) -> Value {
        let mut configurable = Map::new();
        configurable.insert(
            "working_directory".into(),
            json!(config.working_directory.display().to_string()),
        );
        if let Some(model) = &config.model_id {
            configurable.insert("model".into(), json!(model));
        }

        let mut body = json!({
            "assistant_id": self.assistant_id,
            "stream_mode": ["messages-tuple", "values"],
            "config": { "configurable": configurable },
        });

        match input {
            GraphInput::Messages(messages) => {
                body["input"] = json!({ "messages": messages });
            }
            GraphInput::Continue => {
                body["input"] = Value::Null;
            }
            GraphInput::Command { resume, update } => {
                let mut command = Map::new();
                if let Some(resume) = resume {
                    command.insert("resume".into(), resume);
                }
                if let Some(update) = update {
                    command.insert("update".into(), update);
                }
                body["command"] = Value::Object(command);
            }
        }
        body
    }
}

#[async_trait]
impl CheckpointGraph for HttpGraphClient {
    async fn create_thread(&self) -> Result<String> {
        let response = self
            .post("/threads")
            .json(&json!({}))
            .send()
            .await
            .context("Failed to create graph thread")?
            .error_for_status()
            .context("Graph server rejected thread creation")?;
        let body: Value = response
            .json()
            .await
            .context("Failed to decode thread response")?;
        body.get("thread_id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .context("Thread response did not include thread_id")
    }

    async fn stream(
        &self,
        thread_id: &str,
        input: GraphInput,
        config: GraphRunConfig,
    ) -> Result<BoxStream<'static, Result<GraphChunk>>> {
        let body = self.run_body(input, &config);
        tracing::debug!(thread_id = %thread_id, "Starting streamed graph run");

        let response = self
            .post(&format!("/threads/{}/runs/stream", thread_id))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .context("Failed to start graph run")?
            .error_for_status()
            .context("Graph server rejected run")?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                let chunk = match event {
                    Ok(event) => parse_sse_chunk(&event.event, &event.data),
                    Err(e) => Some(Err(anyhow::anyhow!("graph event stream error: {}", e))),
                };
                futures::future::ready(chunk)
            });
        Ok(Box::pin(chunks))
    }
}

/// Map one SSE event to a graph chunk; `None` for bookkeeping events
pub fn parse_sse_chunk(event: &str, data: &str) -> Option<Result<GraphChunk>> {
    let mode = if event.starts_with("messages") {
        UpdateMode::Messages
    } else if event == "values" {
        UpdateMode::Values
    } else if event == "error" {
        let message = serde_json::from_str::<Value>(data)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| data.to_string());
        return Some(Err(anyhow::anyhow!("graph run failed: {}", message)));
    } else {
        tracing::trace!(event = %event, "Ignoring graph SSE event");
        return None;
    };

    Some(
        serde_json::from_str::<Value>(data)
            .map(|payload| GraphChunk { mode, payload })
            .with_context(|| format!("Invalid JSON in graph '{}' event", event)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn client() -> HttpGraphClient {
        HttpGraphClient::new(&GraphConfig {
            url: "http://localhost:2024/".into(),
            assistant_id: "agent".into(),
            api_key: None,
            connect_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_modes() {
        let chunk = parse_sse_chunk("messages", r#"[{"content":"hi"},{}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.mode, UpdateMode::Messages);

        let chunk = parse_sse_chunk("values", r#"{"messages":[]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.mode, UpdateMode::Values);

        assert!(parse_sse_chunk("metadata", r#"{"run_id":"r1"}"#).is_none());
        assert!(parse_sse_chunk("end", "").is_none());
    }

    #[test]
    fn test_parse_error_event() {
        let err = parse_sse_chunk("error", r#"{"error":"GraphRecursionError","message":"too deep"}"#)
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "graph run failed: too deep");
    }

    #[test]
    fn test_run_body_for_each_input() {
        let client = client();
        assert_eq!(client.base_url, "http://localhost:2024");
        let config = GraphRunConfig {
            working_directory: PathBuf::from("/work"),
            model_id: Some("m1".into()),
        };

        let body = client.run_body(GraphInput::Messages(vec![json!({"role": "user"})]), &config);
        assert_eq!(body["input"]["messages"][0]["role"], "user");
        assert_eq!(body["config"]["configurable"]["working_directory"], "/work");
        assert_eq!(body["config"]["configurable"]["model"], "m1");

        let body = client.run_body(GraphInput::Continue, &config);
        assert!(body["input"].is_null());
        assert!(body.get("command").is_none());

        let body = client.run_body(
            GraphInput::Command {
                resume: None,
                update: Some(json!({"editedAction": {"path": "b"}})),
            },
            &config,
        );
        assert_eq!(body["command"]["update"]["editedAction"]["path"], "b");
        assert!(body["command"].get("resume").is_none());
    }
}
