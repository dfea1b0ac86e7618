//! Session - one registry, approval controller and checkpoint store

use eyre::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalController, ApprovalSurface};
use crate::checkpoint::CheckpointService;
use crate::config::Config;
use crate::mcp::McpClientManager;
use crate::tools::builtin::register_builtins;
use crate::tools::{CallOutcome, DiscoverySummary, ToolCall, ToolContext, ToolExecutor, ToolRegistry};

/// Everything one interactive session needs to run tool calls
pub struct Session {
    id: String,
    project_root: PathBuf,
    registry: ToolRegistry,
    executor: ToolExecutor,
    mcp: Arc<McpClientManager>,
    discovery: DiscoverySummary,
}

impl Session {
    /// Build the session and run discovery
    ///
    /// Discovery failures are isolated and only show up in
    /// [`discovery`](Self::discovery). A checkpoint store that cannot be
    /// initialized fails the start when `checkpoint.fail-closed` is set.
    pub async fn start(config: &Config, project_root: &Path, surface: Arc<dyn ApprovalSurface>) -> Result<Self> {
        debug!(?project_root, "Session::start: called");
        let project_root = project_root
            .canonicalize()
            .context(format!("Project root {} is not accessible", project_root.display()))?;
        let id = uuid::Uuid::now_v7().to_string();

        let approval = Arc::new(ApprovalController::new(config.approval.mode, surface));
        let mcp = Arc::new(McpClientManager::new(project_root.clone()));

        let mut registry = ToolRegistry::new(project_root.clone(), mcp.clone())
            .with_tools_config(config.tools.clone())
            .with_servers(config.mcp_servers.clone());
        let builtins = register_builtins(&mut registry, &config.tools.exclude);
        debug!(builtins, "Session::start: built-in tools registered");

        let ctx = ToolContext::new(project_root.clone(), id.clone())
            .with_shell_timeout(Duration::from_millis(config.shell.timeout_ms));
        let mut executor = ToolExecutor::new(approval, ctx);

        if config.checkpoint.enabled {
            let service = CheckpointService::new(&config.checkpoint.data_dir, &project_root);
            match service.initialize().await {
                Ok(()) => {
                    executor = executor.with_checkpoints(Arc::new(service), config.checkpoint.fail_closed);
                }
                Err(e) if config.checkpoint.fail_closed => {
                    return Err(e).context("Failed to initialize checkpoint repository");
                }
                Err(e) => {
                    warn!(error = %e, "Checkpointing disabled for this session");
                }
            }
        }

        let discovery = registry.discover_tools().await;
        info!(session = %id, tools = registry.len(), "Session started");

        Ok(Self {
            id,
            project_root,
            registry,
            executor,
            mcp,
            discovery,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn approval(&self) -> &Arc<ApprovalController> {
        self.executor.approval()
    }

    pub fn checkpoints(&self) -> Option<&Arc<CheckpointService>> {
        self.executor.checkpoints()
    }

    pub fn mcp(&self) -> &Arc<McpClientManager> {
        &self.mcp
    }

    /// Summary of the most recent discovery pass
    pub fn discovery(&self) -> &DiscoverySummary {
        &self.discovery
    }

    /// Run one call through the executor
    pub async fn call(&self, call: &ToolCall, conversation: &Value, cancel: CancellationToken) -> CallOutcome {
        self.executor.run(&self.registry, call, conversation, cancel).await
    }

    /// Drop discovered tools and scan every source again
    pub async fn rediscover(&mut self) -> &DiscoverySummary {
        debug!("Session::rediscover: called");
        self.discovery = self.registry.discover_tools().await;
        &self.discovery
    }

    /// Close every protocol server connection
    pub async fn shutdown(self) {
        debug!(session = %self.id, "Session::shutdown: called");
        self.mcp.disconnect_all().await;
        info!(session = %self.id, "Session shut down");
    }
}
