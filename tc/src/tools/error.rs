//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

use super::schema::ValidationIssue;

/// Errors raised before or around tool execution
///
/// Failures *during* execution are not errors: they come back as a
/// [`ToolResult`](super::ToolResult) with `is_error` set.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {}", format_issues(.issues))]
    Validation { tool: String, issues: Vec<ValidationIssue> },

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Path {path} escapes project root {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Call to {tool} was declined")]
    ConfirmationDeclined { tool: String },

    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] crate::checkpoint::CheckpointError),
}

impl ToolError {
    /// Shorthand for a single-issue validation error
    pub fn validation(tool: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            issues: vec![ValidationIssue::new(field, message)],
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
}
