//! McpClientManager - one connection per configured tool server

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::McpConnection;
use super::error::McpError;
use super::messages::{CallToolResult, McpToolDeclaration};
use crate::config::McpServerConfig;

/// Lifecycle of one server connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// State kept per server
#[derive(Debug)]
pub struct ServerConnection {
    pub status: ServerStatus,
    client: Option<Arc<McpConnection>>,
    /// Tools the server declared in its last listing
    pub tool_names: Vec<String>,
    /// Why the server is disconnected, if it failed
    pub last_error: Option<String>,
    config: McpServerConfig,
}

/// Snapshot of a server's state for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub status: ServerStatus,
    pub tool_names: Vec<String>,
    pub last_error: Option<String>,
}

/// Owns every protocol connection for one discovery epoch
#[derive(Debug)]
pub struct McpClientManager {
    connections: RwLock<HashMap<String, ServerConnection>>,
    project_root: PathBuf,
}

impl McpClientManager {
    /// Create a manager whose servers default to running in `project_root`
    pub fn new(project_root: PathBuf) -> Self {
        debug!(?project_root, "McpClientManager::new: called");
        Self {
            connections: RwLock::new(HashMap::new()),
            project_root,
        }
    }

    /// Spawn and initialise a server
    ///
    /// Failure leaves the server `Disconnected`; other servers are unaffected.
    pub async fn connect(&self, server: &str, config: &McpServerConfig) -> Result<(), McpError> {
        debug!(%server, "McpClientManager::connect: called");
        self.connections.write().await.insert(
            server.to_string(),
            ServerConnection {
                status: ServerStatus::Connecting,
                client: None,
                tool_names: Vec::new(),
                last_error: None,
                config: config.clone(),
            },
        );

        let timeout = config.connect_timeout();
        let result = match McpConnection::spawn(server, config, &self.project_root) {
            Ok(conn) => match tokio::time::timeout(timeout, conn.initialize(timeout)).await {
                Ok(Ok(_)) => Ok(conn),
                Ok(Err(e)) => {
                    conn.close().await;
                    Err(e)
                }
                Err(_) => {
                    conn.close().await;
                    Err(McpError::Timeout {
                        server: server.to_string(),
                        method: "initialize".to_string(),
                        timeout,
                    })
                }
            },
            Err(e) => Err(e),
        };

        let mut connections = self.connections.write().await;
        let Some(entry) = connections.get_mut(server) else {
            // disconnect_all ran while we were connecting
            if let Ok(conn) = result {
                conn.close().await;
            }
            return Err(McpError::NotConnected(server.to_string()));
        };

        match result {
            Ok(conn) => {
                info!(%server, "Connected to tool server");
                entry.status = ServerStatus::Connected;
                entry.client = Some(Arc::new(conn));
                Ok(())
            }
            Err(e) => {
                warn!(%server, error = %e, "Failed to connect to tool server");
                entry.status = ServerStatus::Disconnected;
                entry.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// List the tools a connected server declares
    pub async fn list_tools(&self, server: &str) -> Result<Vec<McpToolDeclaration>, McpError> {
        debug!(%server, "McpClientManager::list_tools: called");
        let (client, timeout) = self.client(server).await?;

        match client.list_tools(timeout).await {
            Ok(tools) => {
                if let Some(entry) = self.connections.write().await.get_mut(server) {
                    entry.tool_names = tools.iter().map(|t| t.name.clone()).collect();
                }
                Ok(tools)
            }
            Err(e) => {
                warn!(%server, error = %e, "Failed to list tools");
                self.mark_disconnected(server, &e).await;
                client.close().await;
                Err(e)
            }
        }
    }

    /// Invoke a tool on a server
    ///
    /// Never fails: transport problems come back as an error result.
    pub async fn call_tool(&self, server: &str, tool: &str, args: Value, cancel: &CancellationToken) -> CallToolResult {
        debug!(%server, %tool, "McpClientManager::call_tool: called");
        let client = match self.client(server).await {
            Ok((client, _)) => client,
            Err(e) => return CallToolResult::failure(e.to_string()),
        };

        match client.call_tool(tool, args, cancel).await {
            Ok(result) => result,
            Err(e) => {
                debug!(%server, %tool, error = %e, "McpClientManager::call_tool: call failed");
                if client.is_closed() {
                    self.mark_disconnected(server, &e).await;
                }
                CallToolResult::failure(e.to_string())
            }
        }
    }

    /// Close every transport and forget every server
    pub async fn disconnect_all(&self) {
        debug!("McpClientManager::disconnect_all: called");
        let drained: Vec<(String, ServerConnection)> = self.connections.write().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "Disconnecting tool servers");
        let closes = drained.into_iter().filter_map(|(name, conn)| {
            conn.client.map(|client| async move {
                client.close().await;
                debug!(server = %name, "McpClientManager::disconnect_all: closed");
            })
        });
        futures::future::join_all(closes).await;
    }

    /// Status of one server, if known
    pub async fn status(&self, server: &str) -> Option<ServerStatus> {
        self.connections.read().await.get(server).map(|c| c.status)
    }

    /// Every known server, sorted by name
    pub async fn statuses(&self) -> Vec<ServerSummary> {
        let connections = self.connections.read().await;
        let mut summaries: Vec<ServerSummary> = connections
            .iter()
            .map(|(name, conn)| ServerSummary {
                name: name.clone(),
                status: conn.status,
                tool_names: conn.tool_names.clone(),
                last_error: conn.last_error.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    async fn client(&self, server: &str) -> Result<(Arc<McpConnection>, Duration), McpError> {
        let connections = self.connections.read().await;
        let entry = connections
            .get(server)
            .ok_or_else(|| McpError::UnknownServer(server.to_string()))?;
        match (&entry.client, entry.status) {
            (Some(client), ServerStatus::Connected) => Ok((client.clone(), entry.config.connect_timeout())),
            _ => Err(McpError::NotConnected(server.to_string())),
        }
    }

    async fn mark_disconnected(&self, server: &str, error: &McpError) {
        if let Some(entry) = self.connections.write().await.get_mut(server) {
            entry.status = ServerStatus::Disconnected;
            entry.client = None;
            entry.tool_names.clear();
            entry.last_error = Some(error.to_string());
        }
    }
}
