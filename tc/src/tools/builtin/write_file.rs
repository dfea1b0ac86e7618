//! write_file tool - create or overwrite a file

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::diff::unified_diff;
use crate::approval::{ConfirmationKind, ConfirmationRequest};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, ToolSource, check_schema};

/// Write a whole file inside the project
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn display_name(&self) -> &str {
        "Write File"
    }

    fn description(&self) -> &str {
        "Create a file or replace its entire content. Parent directories are created as needed."
    }

    fn parameter_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn source(&self) -> ToolSource {
        ToolSource::Builtin
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value, ctx: &ToolContext) -> Result<(), ToolError> {
        check_schema(self, args)?;
        let path = ctx.validate_path(Path::new(args["path"].as_str().unwrap_or_default()))?;
        if path.is_dir() {
            return Err(ToolError::validation(self.name(), "/path", "is a directory"));
        }
        Ok(())
    }

    async fn should_confirm(&self, args: &Value, ctx: &ToolContext) -> Option<ConfirmationRequest> {
        let path = args["path"].as_str().unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();
        let full_path = ctx.validate_path(Path::new(path)).ok()?;

        let (title, old) = match tokio::fs::read_to_string(&full_path).await {
            Ok(old) => (format!("Overwrite {}", path), old),
            Err(_) => (format!("Create {}", path), String::new()),
        };
        let diff = unified_diff(&ctx.display_path(&full_path), &old, content);
        debug!(%path, diff_len = diff.len(), "WriteFileTool::should_confirm: prepared diff");

        Some(ConfirmationRequest::new(ConfirmationKind::Edit, self.name(), title, diff))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext, _cancel: CancellationToken) -> ToolResult {
        debug!("WriteFileTool::execute: called");
        let path = args["path"].as_str().unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories for {}: {}", path, e));
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => {
                debug!(bytes = content.len(), "WriteFileTool::execute: file written");
                ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
            }
            Err(e) => ToolResult::error(format!("Failed to write {}: {}", path, e)),
        }
    }
}
