// ABOUTME: Backend configuration for the three runtime variants.
// ABOUTME: Parsed from TOML sections [graph], [session], and [thread].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for every backend variant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Checkpointed graph server; the variant is unavailable when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub thread: ThreadConfig,
}

/// Graph-checkpoint backend served over HTTP
#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL of the graph server, e.g. "http://localhost:2024"
    pub url: String,
    /// Graph (assistant) to run on each thread
    #[serde(default = "default_assistant_id")]
    pub assistant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Connect timeout in seconds; streams themselves are not time-limited
    #[serde(default = "default_connect_timeout", alias = "timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl GraphConfig {
    /// Graph server at `url` with every other field defaulted
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            assistant_id: default_assistant_id(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// Custom Debug impl to redact api_key
impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("url", &self.url)
            .field("assistant_id", &self.assistant_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Session-resumable backend driven through the Claude CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_binary")]
    pub binary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            binary: default_session_binary(),
            model: None,
            extra_args: Vec::new(),
        }
    }
}

/// Thread-based backend driven through the Codex CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadConfig {
    #[serde(default = "default_thread_binary")]
    pub binary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            binary: default_thread_binary(),
            model: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_assistant_id() -> String {
    "agent".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_session_binary() -> String {
    "claude".to_string()
}

fn default_thread_binary() -> String {
    "codex".to_string()
}

impl BackendsConfig {
    /// Load backend configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse backend configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse backend config TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_backends() {
        let toml = r#"
[graph]
url = "http://localhost:2024"
api_key = "secret"

[session]
binary = "/opt/bin/claude"
model = "sonnet"

[thread]
binary = "codex"
extra_args = ["--skip-git-repo-check"]
"#;
        let config = BackendsConfig::parse(toml).unwrap();
        let graph = config.graph.unwrap();
        assert_eq!(graph.url, "http://localhost:2024");
        assert_eq!(graph.assistant_id, "agent");
        assert_eq!(config.session.binary, "/opt/bin/claude");
        assert_eq!(config.session.model.as_deref(), Some("sonnet"));
        assert_eq!(config.thread.extra_args, vec!["--skip-git-repo-check"]);
    }

    #[test]
    fn test_defaults_without_sections() {
        let config = BackendsConfig::parse("").unwrap();
        assert!(config.graph.is_none());
        assert_eq!(config.session.binary, "claude");
        assert_eq!(config.thread.binary, "codex");
    }

    #[test]
    fn test_graph_debug_redacts_api_key() {
        let config = BackendsConfig::parse("[graph]\nurl = \"http://x\"\napi_key = \"secret\"").unwrap();
        let debug = format!("{:?}", config.graph.unwrap());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_timeout_secs_alias() {
        let config = BackendsConfig::parse("[graph]\nurl = \"http://x\"\ntimeout_secs = 5").unwrap();
        assert_eq!(config.graph.unwrap().connect_timeout_secs, 5);
    }
}
