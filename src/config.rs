// ABOUTME: Configuration loading from switchyard.toml with environment variable overrides
// ABOUTME: Covers runtime selection defaults, the three backends, storage, and logging

use crate::paths::{self, expand_tilde};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchyard_agent::config::GraphConfig;
use switchyard_agent::{BackendsConfig, RuntimeKind};
use switchyard_core::DEFAULT_OVERRIDE_ENV;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SWITCHYARD_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// `[graph]`, `[session]`, and `[thread]` sections
    #[serde(flatten)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime used when neither the conversation nor global settings pick one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Variable holding the process-wide override; empty disables it
    #[serde(default = "default_override_env")]
    pub override_env: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default: None,
            override_env: default_override_env(),
        }
    }
}

impl RuntimeConfig {
    pub fn override_env(&self) -> Option<String> {
        let name = self.override_env.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Write the file log as JSON lines
    #[serde(default)]
    pub json: bool,
}

fn default_override_env() -> String {
    DEFAULT_OVERRIDE_ENV.to_string()
}

fn default_db_path() -> String {
    paths::database_file().to_string_lossy().to_string()
}

impl AppConfig {
    /// Find the config file, checking in order:
    /// 1. SWITCHYARD_CONFIG_PATH env var (if set and the file exists)
    /// 2. ./switchyard.toml
    /// 3. ~/.config/switchyard/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(expand_tilde(&env_path));
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %path.display(), "{} points to a missing file", CONFIG_PATH_ENV);
        }

        let local_config = PathBuf::from("switchyard.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let user_config = paths::config_file();
        if user_config.exists() {
            return Some(user_config);
        }

        None
    }

    /// Load from the discovered config file (or defaults) plus environment overrides
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => Self::read_file(&path)?,
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Self::default()
            }
        };
        config.finish()
    }

    /// Load from an explicit file plus environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finish()
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse a TOML document without consulting the environment
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid switchyard configuration")
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.expand_paths();
        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SWITCHYARD_DEFAULT_RUNTIME") {
            self.runtime.default = Some(val);
        }
        if let Ok(val) = std::env::var("SWITCHYARD_GRAPH_URL") {
            match self.backends.graph.as_mut() {
                Some(graph) => graph.url = val,
                None => self.backends.graph = Some(GraphConfig::new(val)),
            }
        }
        if let Ok(val) = std::env::var("SWITCHYARD_GRAPH_API_KEY") {
            match self.backends.graph.as_mut() {
                Some(graph) => graph.api_key = Some(val),
                None => tracing::warn!("SWITCHYARD_GRAPH_API_KEY set without a graph server URL; ignoring"),
            }
        }
        if let Ok(val) = std::env::var("SWITCHYARD_CLAUDE_BINARY") {
            self.backends.session.binary = val;
        }
        if let Ok(val) = std::env::var("SWITCHYARD_CODEX_BINARY") {
            self.backends.thread.binary = val;
        }
        if let Ok(val) = std::env::var("SWITCHYARD_DB_PATH") {
            self.storage.path = val;
        }
    }

    fn expand_paths(&mut self) {
        self.storage.path = expand_tilde(&self.storage.path);
        if let Some(dir) = self.logging.dir.as_mut() {
            *dir = expand_tilde(dir);
        }
        self.backends.session.binary = expand_tilde(&self.backends.session.binary);
        self.backends.thread.binary = expand_tilde(&self.backends.thread.binary);
    }

    fn validate(&self) -> Result<()> {
        if let Some(default) = &self.runtime.default {
            default
                .parse::<RuntimeKind>()
                .context("Invalid [runtime] default")?;
        }
        if let Some(graph) = &self.backends.graph {
            if graph.url.trim().is_empty() {
                anyhow::bail!("[graph] url cannot be empty");
            }
        }
        if self.storage.path.trim().is_empty() {
            anyhow::bail!("[storage] path cannot be empty");
        }
        Ok(())
    }
}
