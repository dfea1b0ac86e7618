//! Tool system
//!
//! Tools come from three backends behind one `Tool` trait: built-ins,
//! tools declared by a local discovery command, and tools listed by
//! protocol servers. Every call gets a `ToolContext` scoped to the project
//! root - file tools cannot escape that sandbox.

mod context;
mod error;
mod executor;
mod mcp_tool;
mod registry;
mod subprocess;
mod traits;

pub mod builtin;
pub mod process;
pub mod schema;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::{CallOutcome, ToolExecutor};
pub use mcp_tool::{McpTool, sanitize_tool_name};
pub use registry::{DiscoveryState, DiscoverySummary, ToolRegistry};
pub use subprocess::{DiscoveryError, FunctionDeclaration, SubprocessTool, discover_subprocess_tools};
pub use traits::{Tool, ToolCall, ToolDefinition, ToolResult, ToolSource, check_schema};
