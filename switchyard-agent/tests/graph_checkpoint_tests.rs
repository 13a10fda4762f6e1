// ABOUTME: Behaviour of the graph-checkpoint backend against a scripted graph.
// ABOUTME: Covers thread reuse, interrupt detection, HITL decisions, failures, and cancellation.

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::backends::graph_checkpoint::{GraphChunk, GraphInput};
use switchyard_agent::backends::GraphCheckpointBackend;
use switchyard_agent::testing::{collect_events, memory_store, ScriptedGraph, Step};
use switchyard_agent::{
    HitlDecision, InterruptArgs, ResumeArgs, RuntimeBackend, RuntimeKind, StreamEvent, TurnInput,
    UpdateMode,
};
use tokio_util::sync::CancellationToken;

const CONV: &str = "conv-graph";

fn turn(message: &str) -> TurnInput {
    TurnInput {
        conversation_id: CONV.into(),
        message: message.into(),
        working_directory: PathBuf::from("/tmp"),
        model_id: None,
    }
}

fn interrupt(decision: HitlDecision) -> InterruptArgs {
    InterruptArgs {
        conversation_id: CONV.into(),
        working_directory: PathBuf::from("/tmp"),
        decision,
    }
}

fn messages_chunk(text: &str) -> Step<GraphChunk> {
    Step::Emit(GraphChunk {
        mode: UpdateMode::Messages,
        payload: json!([{ "content": text }, { "langgraph_node": "agent" }]),
    })
}

fn interrupt_chunk() -> Step<GraphChunk> {
    Step::Emit(GraphChunk {
        mode: UpdateMode::Values,
        payload: json!({
            "messages": [],
            "__interrupt__": [{
                "value": {
                    "action_requests": [{
                        "name": "write_file",
                        "args": { "path": "a.txt" },
                        "description": "Write a.txt"
                    }]
                }
            }]
        }),
    })
}

fn setup() -> (Arc<ScriptedGraph>, GraphCheckpointBackend, switchyard_agent::SessionIdentityStore) {
    let graph = Arc::new(ScriptedGraph::new());
    let (_store, identities) = memory_store(CONV);
    let backend = GraphCheckpointBackend::new(graph.clone(), identities.clone());
    (graph, backend, identities)
}

#[tokio::test]
async fn test_begin_creates_thread_once_and_reuses_it() {
    let (graph, backend, identities) = setup();
    graph.push_run(vec![messages_chunk("Hel"), messages_chunk("lo")]);
    graph.push_run(vec![messages_chunk("again")]);

    let events = collect_events(backend.begin(turn("hi"), CancellationToken::new())).await;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        StreamEvent::StateUpdate { mode: UpdateMode::Messages, .. }
    ));
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert_eq!(
        identities.get(CONV, RuntimeKind::GraphCheckpoint).await.as_deref(),
        Some("thread-1")
    );

    collect_events(backend.begin(turn("second"), CancellationToken::new())).await;
    assert_eq!(graph.threads_created(), 1);
    let calls = graph.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(thread, _)| thread == "thread-1"));
    let GraphInput::Messages(messages) = &calls[1].1 else {
        panic!("expected message input");
    };
    assert_eq!(messages[0]["content"], "second");
}

#[tokio::test]
async fn test_interrupt_marker_surfaces_in_values_state() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![messages_chunk("Let me write that"), interrupt_chunk()]);

    let events = collect_events(backend.begin(turn("write a.txt"), CancellationToken::new())).await;
    let pending: Vec<_> = events.iter().flat_map(|e| e.pending_interrupt()).collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "write_file");
    assert_eq!(pending[0].args["path"], "a.txt");
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn test_approve_continues_from_checkpoint() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![interrupt_chunk()]);
    graph.push_run(vec![messages_chunk("Wrote a.txt")]);

    collect_events(backend.begin(turn("write a.txt"), CancellationToken::new())).await;
    let events = collect_events(
        backend.respond_to_interrupt(interrupt(HitlDecision::Approve), CancellationToken::new()),
    )
    .await;

    assert_eq!(events.last(), Some(&StreamEvent::Done));
    let calls = graph.calls();
    assert_eq!(calls[1], ("thread-1".to_string(), GraphInput::Continue));
}

#[tokio::test]
async fn test_edit_updates_pending_action() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![interrupt_chunk()]);
    graph.push_run(vec![messages_chunk("Wrote b.txt")]);

    collect_events(backend.begin(turn("write a.txt"), CancellationToken::new())).await;
    let edit = HitlDecision::Edit {
        args: json!({ "path": "b.txt" }),
    };
    collect_events(backend.respond_to_interrupt(interrupt(edit), CancellationToken::new())).await;

    let calls = graph.calls();
    assert_eq!(
        calls[1].1,
        GraphInput::Command {
            resume: None,
            update: Some(json!({ "editedAction": { "path": "b.txt" } })),
        }
    );
}

#[tokio::test]
async fn test_reject_ends_with_done_and_no_graph_call() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![interrupt_chunk()]);
    collect_events(backend.begin(turn("write a.txt"), CancellationToken::new())).await;

    let events = collect_events(
        backend.respond_to_interrupt(interrupt(HitlDecision::Reject), CancellationToken::new()),
    )
    .await;
    assert_eq!(events, vec![StreamEvent::Done]);
    assert_eq!(graph.calls().len(), 1);
}

#[tokio::test]
async fn test_continue_from_checkpoint_sends_decisions() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![interrupt_chunk()]);
    graph.push_run(vec![messages_chunk("done")]);
    collect_events(backend.begin(turn("write a.txt"), CancellationToken::new())).await;

    let args = ResumeArgs {
        conversation_id: CONV.into(),
        working_directory: PathBuf::from("/tmp"),
        payload: json!({ "decision": "approve" }),
    };
    let events = collect_events(backend.continue_from_checkpoint(args, CancellationToken::new())).await;
    assert_eq!(events.last(), Some(&StreamEvent::Done));

    let GraphInput::Command { resume: Some(resume), .. } = &graph.calls()[1].1 else {
        panic!("expected resume command");
    };
    assert_eq!(resume["decisions"][0]["decision"], "approve");
}

#[tokio::test]
async fn test_continue_without_thread_is_an_error() {
    let (graph, backend, _) = setup();
    let args = ResumeArgs {
        conversation_id: CONV.into(),
        working_directory: PathBuf::from("/tmp"),
        payload: json!({}),
    };
    let events = collect_events(backend.continue_from_checkpoint(args, CancellationToken::new())).await;
    assert_eq!(events.len(), 1);
    let StreamEvent::Error { message } = &events[0] else {
        panic!("expected error, got {:?}", events);
    };
    assert!(message.contains("no graph-checkpoint session"));
    assert_eq!(graph.threads_created(), 0);
}

#[tokio::test]
async fn test_mid_stream_failure_is_terminal_error() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![messages_chunk("partial"), Step::Fail("model overloaded".into())]);

    let events = collect_events(backend.begin(turn("hi"), CancellationToken::new())).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1], StreamEvent::error("model overloaded"));
}

#[tokio::test]
async fn test_abort_worded_failure_on_live_run_is_terminal_error() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![Step::Fail(
        "upstream request aborted by server: 502 Bad Gateway".into(),
    )]);

    let events = collect_events(backend.begin(turn("hi"), CancellationToken::new())).await;
    assert_eq!(
        events,
        vec![StreamEvent::error(
            "upstream request aborted by server: 502 Bad Gateway"
        )]
    );
}

#[tokio::test]
async fn test_cancel_mid_stream_emits_no_terminal_event() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![messages_chunk("thinking"), Step::Hang]);

    let token = CancellationToken::new();
    let events = backend.begin(turn("hi"), token.clone());
    let collector = tokio::spawn(collect_events(events));

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let events = tokio::time::timeout(Duration::from_secs(2), collector)
        .await
        .expect("stream should end after cancellation")
        .unwrap();
    assert!(events.iter().all(|e| !e.is_terminal()));
}

#[tokio::test]
async fn test_cancelled_before_poll_emits_nothing() {
    let (graph, backend, _) = setup();
    graph.push_run(vec![messages_chunk("never seen")]);

    let token = CancellationToken::new();
    let events = backend.begin(turn("hi"), token.clone());
    token.cancel();
    assert!(collect_events(events).await.is_empty());
}
