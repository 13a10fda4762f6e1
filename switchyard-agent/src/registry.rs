// ABOUTME: Registry of runtime backends keyed by runtime kind.
// ABOUTME: Built from configuration; the coordinator looks backends up per run.

use crate::approval::ApprovalSurface;
use crate::backends::claude_cli::ClaudeCliClient;
use crate::backends::codex_cli::CodexCliClient;
use crate::backends::graph_http::HttpGraphClient;
use crate::backends::{GraphCheckpointBackend, SessionResumableBackend, ThreadBasedBackend};
use crate::command::RuntimeKind;
use crate::config::BackendsConfig;
use crate::identity::SessionIdentityStore;
use crate::traits::RuntimeBackend;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Backends available to this process
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<RuntimeKind, Arc<dyn RuntimeBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own kind, replacing any previous one
    pub fn register(mut self, backend: Arc<dyn RuntimeBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn get(&self, kind: RuntimeKind) -> Result<Arc<dyn RuntimeBackend>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| anyhow!("{} runtime is not configured", kind))
    }

    /// Registered kinds in declaration order
    pub fn available(&self) -> Vec<RuntimeKind> {
        RuntimeKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.backends.contains_key(kind))
            .collect()
    }

    /// Build the production backends. The graph variant needs a server URL;
    /// the CLI-driven variants are always registered.
    pub fn from_config(
        config: &BackendsConfig,
        identities: SessionIdentityStore,
        approval: Arc<dyn ApprovalSurface>,
    ) -> Result<Self> {
        let mut registry = Self::new();

        match &config.graph {
            Some(graph) => {
                let client = Arc::new(HttpGraphClient::new(graph)?);
                registry = registry.register(Arc::new(GraphCheckpointBackend::new(
                    client,
                    identities.clone(),
                )));
            }
            None => tracing::info!("No [graph] section configured; graph-checkpoint runtime disabled"),
        }

        let claude = Arc::new(ClaudeCliClient::new(config.session.clone()));
        let codex = Arc::new(CodexCliClient::new(config.thread.clone()));
        registry = registry
            .register(Arc::new(SessionResumableBackend::new(
                claude,
                identities.clone(),
                Arc::clone(&approval),
            )))
            .register(Arc::new(ThreadBasedBackend::new(codex, identities, approval)));

        tracing::debug!(available = ?registry.available(), "Backend registry ready");
        Ok(registry)
    }
}
