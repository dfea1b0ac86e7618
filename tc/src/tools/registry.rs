//! ToolRegistry - every tool known to a session

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::mcp_tool::McpTool;
use super::subprocess::discover_subprocess_tools;
use super::{Tool, ToolDefinition};
use crate::config::{McpServerConfig, ToolsConfig};
use crate::mcp::{McpClientManager, McpError, McpToolDeclaration};

/// Progress of the protocol-server discovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// What one `discover_tools` pass found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    pub subprocess_tools: usize,
    pub subprocess_error: Option<String>,
    /// Registered tool count per connected server
    pub server_tools: BTreeMap<String, usize>,
    /// Servers that failed, with the reason
    pub failed_servers: Vec<(String, String)>,
}

impl DiscoverySummary {
    pub fn total_discovered(&self) -> usize {
        self.subprocess_tools + self.server_tools.values().sum::<usize>()
    }
}

/// Holds built-in and discovered tools by name
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Built-ins as registered; each discovery pass starts from these
    builtins: HashMap<String, Arc<dyn Tool>>,
    mcp: Arc<McpClientManager>,
    project_root: PathBuf,
    tools_config: ToolsConfig,
    servers: BTreeMap<String, McpServerConfig>,
    discovery_state: DiscoveryState,
}

impl ToolRegistry {
    /// Create an empty registry with no discovery sources
    pub fn new(project_root: PathBuf, mcp: Arc<McpClientManager>) -> Self {
        debug!(?project_root, "ToolRegistry::new: called");
        Self {
            tools: HashMap::new(),
            builtins: HashMap::new(),
            mcp,
            project_root,
            tools_config: ToolsConfig::default(),
            servers: BTreeMap::new(),
            discovery_state: DiscoveryState::NotStarted,
        }
    }

    /// Builder method to configure subprocess discovery
    pub fn with_tools_config(mut self, tools_config: ToolsConfig) -> Self {
        self.tools_config = tools_config;
        self
    }

    /// Builder method to configure protocol servers
    pub fn with_servers(mut self, servers: BTreeMap<String, McpServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    /// Insert a tool; an existing tool with the same name is replaced
    ///
    /// Returns the replaced tool. A discovered tool may shadow a built-in
    /// until the next discovery pass, which brings the built-in back.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        debug!(%name, source = %tool.source(), "ToolRegistry::register: called");
        if tool.source().is_builtin() {
            self.builtins.insert(name.clone(), tool.clone());
        }
        let previous = self.tools.insert(name.clone(), tool);
        if let Some(prev) = &previous {
            warn!(%name, previous_source = %prev.source(), "Tool already registered, overwriting");
        }
        previous
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        debug!(%name, "ToolRegistry::unregister: called");
        self.builtins.remove(name);
        self.tools.remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tools, sorted by name
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Tool definitions for the model, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list().iter().map(|t| t.definition()).collect()
    }

    /// Tools discovered from one server, sorted by name
    pub fn tools_for_server(&self, server: &str) -> Vec<Arc<dyn Tool>> {
        self.list()
            .into_iter()
            .filter(|t| t.source().server() == Some(server))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery_state
    }

    pub fn mcp(&self) -> &Arc<McpClientManager> {
        &self.mcp
    }

    /// Re-scan every discovery source
    ///
    /// Previously discovered tools are dropped and every server connection
    /// is closed first, so repeated calls converge on the same registry.
    /// Each server is discovered in its own task; a failing server is logged
    /// and recorded in the summary without affecting the others.
    pub async fn discover_tools(&mut self) -> DiscoverySummary {
        debug!("ToolRegistry::discover_tools: called");
        let mut summary = DiscoverySummary::default();

        self.tools = self.builtins.clone();
        self.mcp.disconnect_all().await;

        self.discover_subprocess(&mut summary).await;

        self.discovery_state = DiscoveryState::InProgress;
        let mut tasks = JoinSet::new();
        for (name, config) in &self.servers {
            let mcp = self.mcp.clone();
            let name = name.clone();
            let config = config.clone();
            tasks.spawn(async move {
                let result = connect_and_list(&mcp, &name, &config).await;
                (name, config, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, config, Ok(decls))) => {
                    let count = self.register_server_tools(&name, &config, decls);
                    info!(server = %name, count, "Registered tools from server");
                    summary.server_tools.insert(name, count);
                }
                Ok((name, _, Err(e))) => {
                    warn!(server = %name, error = %e, "Tool server discovery failed, skipping");
                    summary.failed_servers.push((name, e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "Tool server discovery task died");
                }
            }
        }
        summary.failed_servers.sort();
        self.discovery_state = DiscoveryState::Completed;

        info!(
            total = self.tools.len(),
            discovered = summary.total_discovered(),
            failed = summary.failed_servers.len(),
            "Tool discovery complete"
        );
        summary
    }

    async fn discover_subprocess(&mut self, summary: &mut DiscoverySummary) {
        let Some(discovery_command) = self.tools_config.discovery_command.clone() else {
            debug!("ToolRegistry::discover_subprocess: no discovery command configured");
            return;
        };
        let Some(call_command) = self.tools_config.call_command.clone() else {
            warn!("Discovery command configured without a call command, skipping subprocess discovery");
            summary.subprocess_error = Some("no call-command configured".to_string());
            return;
        };

        match discover_subprocess_tools(
            &discovery_command,
            &call_command,
            &self.project_root,
            self.tools_config.discovery_timeout(),
            self.tools_config.call_timeout(),
        )
        .await
        {
            Ok(tools) => {
                for tool in tools {
                    if self.tools_config.exclude.iter().any(|n| n == tool.name()) {
                        debug!(tool = %tool.name(), "ToolRegistry::discover_subprocess: excluded");
                        continue;
                    }
                    self.register(Arc::new(tool));
                    summary.subprocess_tools += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, "Subprocess tool discovery failed, skipping");
                summary.subprocess_error = Some(e.to_string());
            }
        }
    }

    fn register_server_tools(&mut self, server: &str, config: &McpServerConfig, decls: Vec<McpToolDeclaration>) -> usize {
        let mut count = 0;
        for decl in decls {
            if !config.allows_tool(&decl.name) {
                debug!(%server, tool = %decl.name, "ToolRegistry::register_server_tools: filtered out");
                continue;
            }
            self.register(Arc::new(McpTool::new(server, decl, config.trust, self.mcp.clone())));
            count += 1;
        }
        count
    }
}

async fn connect_and_list(
    mcp: &McpClientManager,
    server: &str,
    config: &McpServerConfig,
) -> Result<Vec<McpToolDeclaration>, McpError> {
    mcp.connect(server, config).await?;
    mcp.list_tools(server).await
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("discovery_state", &self.discovery_state)
            .finish()
    }
}
