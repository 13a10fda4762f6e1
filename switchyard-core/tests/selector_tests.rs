// ABOUTME: Runtime selector precedence tests, including the process-wide env override.
// ABOUTME: Env-mutating tests run serially.

use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use switchyard_agent::{Conversation, ConversationStore, InMemoryConversationStore, RuntimeKind};
use switchyard_core::selector::DEFAULT_OVERRIDE_ENV;
use switchyard_core::{RuntimeSelector, SelectionSource, RUNTIME_KEY};

fn store_with_conversation(runtime: Option<&str>) -> Arc<InMemoryConversationStore> {
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = Conversation::new("c1", "/tmp");
    if let Some(runtime) = runtime {
        conversation = conversation.with_metadata(RUNTIME_KEY, json!(runtime));
    }
    store.insert(conversation);
    store
}

#[tokio::test]
#[serial]
async fn test_conversation_override_beats_global_default() {
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    let store = store_with_conversation(Some("session-resumable"));
    store.set_setting(RUNTIME_KEY, "graph-checkpoint").await.unwrap();

    let selector = RuntimeSelector::new(store);
    assert_eq!(
        selector.resolve_with_source("c1").await,
        (RuntimeKind::SessionResumable, SelectionSource::Conversation)
    );
}

#[tokio::test]
#[serial]
async fn test_env_override_beats_everything() {
    std::env::set_var(DEFAULT_OVERRIDE_ENV, "thread-based");
    let store = store_with_conversation(Some("session-resumable"));
    let selector = RuntimeSelector::new(store).with_default("graph-checkpoint");

    let resolved = selector.resolve_with_source("c1").await;
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    assert_eq!(resolved, (RuntimeKind::ThreadBased, SelectionSource::ProcessOverride));
}

#[tokio::test]
#[serial]
async fn test_invalid_env_override_falls_through() {
    std::env::set_var(DEFAULT_OVERRIDE_ENV, "turbo");
    let store = store_with_conversation(Some("thread-based"));
    let resolved = RuntimeSelector::new(store).resolve("c1").await;
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    assert_eq!(resolved, RuntimeKind::ThreadBased);
}

#[tokio::test]
#[serial]
async fn test_explicit_override_beats_env() {
    std::env::set_var(DEFAULT_OVERRIDE_ENV, "thread-based");
    let store = store_with_conversation(None);
    let resolved = RuntimeSelector::new(store)
        .with_override("session-resumable")
        .resolve_with_source("c1")
        .await;
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    assert_eq!(resolved, (RuntimeKind::SessionResumable, SelectionSource::ProcessOverride));
}

#[tokio::test]
#[serial]
async fn test_resolution_is_fresh_each_call() {
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    let store = store_with_conversation(None);
    let selector = RuntimeSelector::new(store.clone()).with_default("graph-checkpoint");
    assert_eq!(selector.resolve("c1").await, RuntimeKind::GraphCheckpoint);

    selector
        .set_conversation_runtime("c1", RuntimeKind::ThreadBased)
        .await
        .unwrap();
    assert_eq!(selector.resolve("c1").await, RuntimeKind::ThreadBased);

    selector.clear_conversation_runtime("c1").await.unwrap();
    assert_eq!(
        selector.resolve_with_source("c1").await,
        (RuntimeKind::GraphCheckpoint, SelectionSource::ConfiguredDefault)
    );
    let conversation = store.get_conversation("c1").await.unwrap().unwrap();
    assert!(!conversation.metadata.contains_key(RUNTIME_KEY));
}

#[tokio::test]
#[serial]
async fn test_global_setting_beats_configured_default() {
    std::env::remove_var(DEFAULT_OVERRIDE_ENV);
    let store = store_with_conversation(None);
    let selector = RuntimeSelector::new(store).with_default("graph-checkpoint");
    selector.set_default_runtime(RuntimeKind::SessionResumable).await.unwrap();
    assert_eq!(
        selector.resolve_with_source("c1").await,
        (RuntimeKind::SessionResumable, SelectionSource::GlobalSetting)
    );
}
