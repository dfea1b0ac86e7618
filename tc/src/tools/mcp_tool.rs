//! Tools discovered from external tool servers

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::schema::sanitize_schema;
use super::{Tool, ToolContext, ToolResult, ToolSource};
use crate::approval::{ConfirmationKind, ConfirmationRequest};
use crate::mcp::{McpClientManager, McpToolDeclaration};

/// Longest tool name model APIs accept
const MAX_TOOL_NAME_LEN: usize = 63;

/// Make a server-declared name safe as a registry key
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`; over-long names keep
/// their first 28 and last 32 characters around a `___` marker.
pub fn sanitize_tool_name(name: &str) -> String {
    let cleaned: Vec<char> = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.len() > MAX_TOOL_NAME_LEN {
        let head: String = cleaned[..28].iter().collect();
        let tail: String = cleaned[cleaned.len() - 32..].iter().collect();
        format!("{}___{}", head, tail)
    } else {
        cleaned.into_iter().collect()
    }
}

/// Adapter forwarding calls to a tool on a protocol server
pub struct McpTool {
    /// Registry key (sanitized)
    name: String,
    /// Name the server knows the tool by
    server_tool_name: String,
    server: String,
    description: String,
    schema: Value,
    trusted: bool,
    manager: Arc<McpClientManager>,
}

impl McpTool {
    pub fn new(server: &str, decl: McpToolDeclaration, trusted: bool, manager: Arc<McpClientManager>) -> Self {
        debug!(%server, tool = %decl.name, "McpTool::new: called");
        Self {
            name: sanitize_tool_name(&decl.name),
            server: server.to_string(),
            description: decl.description.unwrap_or_default(),
            schema: sanitize_schema(&decl.input_schema),
            server_tool_name: decl.name,
            trusted,
            manager,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.server_tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> Value {
        self.schema.clone()
    }

    fn source(&self) -> ToolSource {
        ToolSource::Protocol {
            server: self.server.clone(),
        }
    }

    // Remote side effects are invisible to us; snapshot to be safe
    fn is_mutating(&self) -> bool {
        true
    }

    async fn should_confirm(&self, args: &Value, _ctx: &ToolContext) -> Option<ConfirmationRequest> {
        if self.trusted {
            debug!(server = %self.server, "McpTool::should_confirm: server is trusted");
            return None;
        }

        let summary = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
        Some(
            ConfirmationRequest::new(
                ConfirmationKind::ProtocolCall,
                &self.name,
                format!("Call {} on server {}", self.server_tool_name, self.server),
                summary,
            )
            .with_scope(&self.server),
        )
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext, cancel: CancellationToken) -> ToolResult {
        debug!(server = %self.server, tool = %self.server_tool_name, "McpTool::execute: called");
        let result = self
            .manager
            .call_tool(&self.server, &self.server_tool_name, args, &cancel)
            .await;

        if cancel.is_cancelled() {
            return ToolResult::cancelled();
        }

        let display = result.display_text();
        ToolResult::structured(Value::Array(result.content), display, result.is_error)
    }
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.name)
            .field("server", &self.server)
            .finish()
    }
}
