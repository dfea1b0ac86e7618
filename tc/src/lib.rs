//! toolcore - tool execution core for interactive agent CLIs
//!
//! Tools come from three backends (built-in, subprocess-discovered and
//! protocol-server-discovered) and are driven through one contract:
//! validate, optionally confirm, then execute. Risky calls are gated by a
//! session-scoped approval controller and mutating calls can be snapshotted
//! into a hidden repository so they can be undone.

pub mod approval;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod mcp;
pub mod session;
pub mod tools;

pub use approval::{
    ApprovalController, ApprovalMode, ApprovalSurface, ChannelApprovalSurface, ConfirmationKind, ConfirmationOutcome,
    ConfirmationRequest, PendingConfirmation,
};
pub use checkpoint::{CheckpointError, CheckpointRecord, CheckpointService};
pub use config::{Config, McpServerConfig};
pub use mcp::{McpClientManager, McpError, ServerStatus};
pub use session::Session;
pub use tools::{
    CallOutcome, DiscoveryState, DiscoverySummary, Tool, ToolCall, ToolContext, ToolError, ToolExecutor,
    ToolRegistry, ToolResult, ToolSource,
};
