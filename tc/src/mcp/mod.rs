//! Client side of the tool-server protocol (MCP over stdio)
//!
//! Each configured server is a child process speaking JSON-RPC 2.0, one
//! message per line. Its stderr is a diagnostic side channel that gets
//! filtered into the log.

mod client;
mod error;
mod manager;
pub mod messages;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{McpConnection, StderrLevel, classify_stderr};
pub use error::McpError;
pub use manager::{McpClientManager, ServerConnection, ServerStatus, ServerSummary};
pub use messages::{CallToolResult, McpToolDeclaration};
