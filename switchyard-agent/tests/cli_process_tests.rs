// ABOUTME: End-to-end tests of the CLI-driven clients against fake executables.
// ABOUTME: The fakes speak just enough of each CLI's JSON protocol to drive a turn.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::backends::claude_cli::ClaudeCliClient;
use switchyard_agent::backends::codex_cli::CodexCliClient;
use switchyard_agent::backends::{SessionResumableBackend, ThreadBasedBackend};
use switchyard_agent::config::{SessionConfig, ThreadConfig};
use switchyard_agent::testing::{collect_events, memory_store};
use switchyard_agent::{RuntimeBackend, RuntimeKind, StaticApproval, StreamEvent, TurnInput};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FAKE_CLAUDE: &str = r#"#!/bin/sh
read -r _prompt
echo '{"type":"system","subtype":"init","session_id":"cli-sess"}'
echo '{"type":"control_request","request_id":"req-1","request":{"subtype":"can_use_tool","tool_name":"Write","input":{"path":"a.txt"}}}'
read -r response
case "$response" in
  *'"behavior":"allow"'*) verdict=allowed ;;
  *) verdict=denied ;;
esac
echo "{\"type\":\"assistant\",\"message\":{\"id\":\"m1\",\"content\":[{\"type\":\"text\",\"text\":\"$verdict\"}]}}"
echo '{"type":"result","subtype":"success","is_error":false}'
"#;

const SLOW_CLAUDE: &str = r#"#!/bin/sh
read -r _prompt
echo '{"type":"system","subtype":"init","session_id":"slow-sess"}'
sleep 30
echo '{"type":"result","subtype":"success","is_error":false}'
"#;

// Echoes the sandbox flag back as the agent message
const FAKE_CODEX: &str = r#"#!/bin/sh
echo '{"type":"thread.started","thread_id":"codex-thread"}'
echo "{\"type\":\"item.completed\",\"item\":{\"id\":\"item_0\",\"type\":\"agent_message\",\"text\":\"$4\"}}"
echo '{"type":"turn.completed","usage":{"input_tokens":3,"output_tokens":1}}'
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

fn turn(conversation_id: &str, dir: &Path) -> TurnInput {
    TurnInput {
        conversation_id: conversation_id.into(),
        message: "write a.txt".into(),
        working_directory: PathBuf::from(dir),
        model_id: None,
    }
}

#[tokio::test]
async fn test_claude_cli_permission_round_trip() {
    let dir = TempDir::new().unwrap();
    let binary = write_script(dir.path(), "claude", FAKE_CLAUDE);
    let (_store, identities) = memory_store("c1");
    let client = Arc::new(ClaudeCliClient::new(SessionConfig {
        binary,
        ..Default::default()
    }));

    let allowing = SessionResumableBackend::new(
        client.clone(),
        identities.clone(),
        Arc::new(StaticApproval::allow_all()),
    );
    let events = collect_events(allowing.begin(turn("c1", dir.path()), CancellationToken::new())).await;
    assert_eq!(
        events,
        vec![StreamEvent::token("m1", "allowed"), StreamEvent::Done]
    );
    assert_eq!(
        identities.get("c1", RuntimeKind::SessionResumable).await.as_deref(),
        Some("cli-sess")
    );

    let denying = SessionResumableBackend::new(client, identities, Arc::new(StaticApproval::deny_all()));
    let events = collect_events(denying.begin(turn("c1", dir.path()), CancellationToken::new())).await;
    assert_eq!(events[0], StreamEvent::token("m1", "denied"));
}

#[tokio::test]
async fn test_claude_cli_cancel_kills_process_quietly() {
    let dir = TempDir::new().unwrap();
    let binary = write_script(dir.path(), "claude", SLOW_CLAUDE);
    let (_store, identities) = memory_store("c1");
    let backend = SessionResumableBackend::new(
        Arc::new(ClaudeCliClient::new(SessionConfig {
            binary,
            ..Default::default()
        })),
        identities,
        Arc::new(StaticApproval::allow_all()),
    );

    let token = CancellationToken::new();
    let collector = tokio::spawn(collect_events(backend.begin(turn("c1", dir.path()), token.clone())));
    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();

    let events = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .expect("cancelled run should end promptly")
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_claude_cli_missing_binary_is_an_error() {
    let dir = TempDir::new().unwrap();
    let (_store, identities) = memory_store("c1");
    let backend = SessionResumableBackend::new(
        Arc::new(ClaudeCliClient::new(SessionConfig {
            binary: dir.path().join("nope").display().to_string(),
            ..Default::default()
        })),
        identities,
        Arc::new(StaticApproval::allow_all()),
    );

    let events = collect_events(backend.begin(turn("c1", dir.path()), CancellationToken::new())).await;
    assert_eq!(events.len(), 1);
    let StreamEvent::Error { message } = &events[0] else {
        panic!("expected error, got {:?}", events);
    };
    assert!(message.contains("Failed to spawn Claude CLI"));
}

#[tokio::test]
async fn test_codex_cli_sandbox_follows_gate() {
    let dir = TempDir::new().unwrap();
    let binary = write_script(dir.path(), "codex", FAKE_CODEX);
    let (_store, identities) = memory_store("c2");
    let client = Arc::new(CodexCliClient::new(ThreadConfig {
        binary,
        ..Default::default()
    }));

    let denying = ThreadBasedBackend::new(
        client.clone(),
        identities.clone(),
        Arc::new(StaticApproval::deny_all()),
    );
    let events = collect_events(denying.begin(turn("c2", dir.path()), CancellationToken::new())).await;
    assert_eq!(
        events,
        vec![StreamEvent::token("item_0", "read-only"), StreamEvent::Done]
    );
    assert_eq!(
        identities.get("c2", RuntimeKind::ThreadBased).await.as_deref(),
        Some("codex-thread")
    );
}
