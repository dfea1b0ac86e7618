//! Tool trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::context::ToolContext;
use super::error::ToolError;
use super::schema;
use crate::approval::ConfirmationRequest;

/// A tool that can be called by the model
///
/// Contract: `validate` is pure, `should_confirm` may only do read-only
/// preparation, and `execute` is the only method with side effects. The
/// caller never runs `execute` for args that failed `validate`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry key (matches the model's tool-call name)
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON Schema for the arguments
    fn parameter_schema(&self) -> Value;

    /// Which backend runs this tool
    fn source(&self) -> ToolSource;

    /// Whether executing may modify the workspace (drives checkpointing)
    fn is_mutating(&self) -> bool {
        false
    }

    /// Check args before anything else happens
    fn validate(&self, args: &Value, _ctx: &ToolContext) -> Result<(), ToolError> {
        check_schema(self, args)
    }

    /// Describe the call for the human, or `None` to execute directly
    async fn should_confirm(&self, _args: &Value, _ctx: &ToolContext) -> Option<ConfirmationRequest> {
        None
    }

    /// Run the tool; failures are reported in the result, never thrown
    async fn execute(&self, args: Value, ctx: &ToolContext, cancel: CancellationToken) -> ToolResult;

    /// Name, description and schema for the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameter_schema(),
        }
    }
}

/// Check args against the tool's parameter schema
///
/// Tools overriding `validate` call this before their own checks.
pub fn check_schema<T: Tool + ?Sized>(tool: &T, args: &Value) -> Result<(), ToolError> {
    schema::validate(&tool.parameter_schema(), args).map_err(|issues| ToolError::Validation {
        tool: tool.name().to_string(),
        issues,
    })
}

/// Where a tool comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolSource {
    Builtin,
    Subprocess,
    Protocol { server: String },
}

impl ToolSource {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin)
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Protocol { server } => Some(server),
            _ => None,
        }
    }
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::Subprocess => write!(f, "subprocess"),
            Self::Protocol { server } => write!(f, "mcp:{}", server),
        }
    }
}

/// Tool declaration handed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A call proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a call with a fresh id
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.into(),
            args,
        }
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content fed back to the model
    pub raw_content: Value,
    /// Content shown to the human
    pub display_content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        debug!("ToolResult::success: called");
        let content = content.into();
        Self {
            raw_content: Value::String(content.clone()),
            display_content: content,
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(content: impl Into<String>) -> Self {
        debug!("ToolResult::error: called");
        let content = content.into();
        Self {
            raw_content: Value::String(content.clone()),
            display_content: content,
            is_error: true,
        }
    }

    /// Create a result whose model-facing content is structured
    pub fn structured(raw_content: Value, display_content: impl Into<String>, is_error: bool) -> Self {
        debug!(is_error, "ToolResult::structured: called");
        Self {
            raw_content,
            display_content: display_content.into(),
            is_error,
        }
    }

    /// Result for a call abandoned through its cancel token
    pub fn cancelled() -> Self {
        Self::error("Tool call was cancelled")
    }

    /// Raw content as text for the model
    pub fn raw_text(&self) -> String {
        match &self.raw_content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
