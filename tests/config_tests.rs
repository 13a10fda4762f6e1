// ABOUTME: Tests for config discovery, environment overrides, and tilde expansion
// ABOUTME: Env-mutating tests are serialized with serial_test

use serial_test::serial;
use std::fs;
use switchyard::config::{AppConfig, CONFIG_PATH_ENV};
use tempfile::TempDir;

const OVERRIDE_VARS: &[&str] = &[
    CONFIG_PATH_ENV,
    "SWITCHYARD_DEFAULT_RUNTIME",
    "SWITCHYARD_GRAPH_URL",
    "SWITCHYARD_GRAPH_API_KEY",
    "SWITCHYARD_CLAUDE_BINARY",
    "SWITCHYARD_CODEX_BINARY",
    "SWITCHYARD_DB_PATH",
];

fn clear_env() {
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("switchyard.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[runtime]
default = "session-resumable"

[graph]
url = "http://graph:2024"
timeout_secs = 10

[storage]
path = "/tmp/conversations.db"
"#,
    );

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.runtime.default.as_deref(), Some("session-resumable"));
    let graph = config.backends.graph.unwrap();
    assert_eq!(graph.url, "http://graph:2024");
    assert_eq!(graph.connect_timeout_secs, 10);
    assert_eq!(config.storage.path, "/tmp/conversations.db");
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[runtime]
default = "graph-checkpoint"

[session]
binary = "claude"
"#,
    );

    std::env::set_var("SWITCHYARD_DEFAULT_RUNTIME", "thread-based");
    std::env::set_var("SWITCHYARD_CLAUDE_BINARY", "/opt/claude");
    std::env::set_var("SWITCHYARD_CODEX_BINARY", "/opt/codex");
    std::env::set_var("SWITCHYARD_DB_PATH", "/data/switchyard.db");

    let config = AppConfig::load_from(&path).unwrap();
    clear_env();

    assert_eq!(config.runtime.default.as_deref(), Some("thread-based"));
    assert_eq!(config.backends.session.binary, "/opt/claude");
    assert_eq!(config.backends.thread.binary, "/opt/codex");
    assert_eq!(config.storage.path, "/data/switchyard.db");
}

#[test]
#[serial]
fn test_graph_url_env_enables_graph_backend() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    std::env::set_var("SWITCHYARD_GRAPH_URL", "http://localhost:2024");
    std::env::set_var("SWITCHYARD_GRAPH_API_KEY", "sk-test");
    let config = AppConfig::load_from(&path).unwrap();
    clear_env();

    let graph = config.backends.graph.unwrap();
    assert_eq!(graph.url, "http://localhost:2024");
    assert_eq!(graph.api_key.as_deref(), Some("sk-test"));
    assert_eq!(graph.assistant_id, "agent");
}

#[test]
#[serial]
fn test_invalid_default_runtime_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[runtime]\ndefault = \"langgraph\"\n");
    assert!(AppConfig::load_from(&path).is_err());

    let valid = write_config(&dir, "");
    std::env::set_var("SWITCHYARD_DEFAULT_RUNTIME", "nonsense");
    let result = AppConfig::load_from(&valid);
    clear_env();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_config_path_env_is_discovered() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[thread]\nbinary = \"codex-nightly\"\n");

    std::env::set_var(CONFIG_PATH_ENV, &path);
    let config = AppConfig::load().unwrap();
    clear_env();

    assert_eq!(config.backends.thread.binary, "codex-nightly");
}

#[test]
#[serial]
fn test_tilde_expanded_in_storage_path() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[storage]\npath = \"~/switchyard/test.db\"\n");

    let config = AppConfig::load_from(&path).unwrap();
    if let Some(base) = directories::BaseDirs::new() {
        assert_eq!(
            std::path::PathBuf::from(&config.storage.path),
            base.home_dir().join("switchyard/test.db")
        );
    }
}

#[test]
fn test_malformed_toml_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[graph\nurl = ");
    let err = AppConfig::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("switchyard.toml"));
}
