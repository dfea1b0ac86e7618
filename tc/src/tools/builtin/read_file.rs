//! read_file tool - read file contents with line numbers

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult, ToolSource, check_schema};

/// Default number of lines returned
const DEFAULT_LIMIT: usize = 2000;

/// Lines longer than this are cut
const MAX_LINE_LEN: usize = 2000;

/// Read a file inside the project
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn display_name(&self) -> &str {
        "Read File"
    }

    fn description(&self) -> &str {
        "Read a file from the project. Returns numbered lines; use offset and limit for large files."
    }

    fn parameter_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to return, 1-based (default: 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines (default: 2000)"
                }
            },
            "required": ["path"]
        })
    }

    fn source(&self) -> ToolSource {
        ToolSource::Builtin
    }

    fn validate(&self, args: &Value, ctx: &ToolContext) -> Result<(), ToolError> {
        check_schema(self, args)?;
        ctx.validate_path(Path::new(args["path"].as_str().unwrap_or_default()))?;
        if args["offset"].as_i64().is_some_and(|o| o < 1) {
            return Err(ToolError::validation(self.name(), "/offset", "must be at least 1"));
        }
        if args["limit"].as_i64().is_some_and(|l| l < 1) {
            return Err(ToolError::validation(self.name(), "/limit", "must be at least 1"));
        }
        Ok(())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext, _cancel: CancellationToken) -> ToolResult {
        debug!(?args, "ReadFileTool::execute: called");
        let path = args["path"].as_str().unwrap_or_default();
        let offset = args["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = args["limit"].as_u64().map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(%e, "ReadFileTool::execute: failed to read file");
                return ToolResult::error(format!("Failed to read {}: {}", path, e));
            }
        };

        let total = content.lines().count();
        let mut output = String::new();
        for (i, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
            let line = match line.char_indices().nth(MAX_LINE_LEN) {
                Some((cut, _)) => format!("{}...", &line[..cut]),
                None => line.to_string(),
            };
            output.push_str(&format!("{:>6}\t{}\n", i + 1, line));
        }

        let shown_end = (offset - 1 + limit).min(total);
        if shown_end < total {
            output.push_str(&format!(
                "\n[showing lines {}-{} of {}; use offset to read more]\n",
                offset, shown_end, total
            ));
        }

        debug!(total, "ReadFileTool::execute: read complete");
        ToolResult::success(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_with_line_numbers() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "alpha\nbeta\n").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ReadFileTool
            .execute(json!({"path": "a.txt"}), &ctx, CancellationToken::new())
            .await;

        assert!(!result.is_error);
        assert_eq!(result.display_content, "     1\talpha\n     2\tbeta\n");
    }

    #[tokio::test]
    async fn test_read_offset_and_limit() {
        let temp = tempdir().unwrap();
        let content: String = (1..=10).map(|i| format!("line{}\n", i)).collect();
        fs::write(temp.path().join("a.txt"), content).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ReadFileTool
            .execute(
                json!({"path": "a.txt", "offset": 3, "limit": 2}),
                &ctx,
                CancellationToken::new(),
            )
            .await;

        assert!(result.display_content.contains("     3\tline3\n     4\tline4\n"));
        assert!(!result.display_content.contains("line5"));
        assert!(result.display_content.contains("showing lines 3-4 of 10"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ReadFileTool
            .execute(json!({"path": "nope.txt"}), &ctx, CancellationToken::new())
            .await;
        assert!(result.is_error);
    }

    #[test]
    fn test_validate_rejects_outside_root_and_bad_offset() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        assert!(matches!(
            ReadFileTool.validate(&json!({"path": "/etc/passwd"}), &ctx),
            Err(ToolError::SandboxViolation { .. })
        ));
        assert!(ReadFileTool.validate(&json!({"path": "a", "offset": 0}), &ctx).is_err());
        assert!(ReadFileTool.validate(&json!({}), &ctx).is_err());
        assert!(ReadFileTool.validate(&json!({"path": "a"}), &ctx).is_ok());
    }

    #[tokio::test]
    async fn test_read_file_never_confirms() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        assert!(ReadFileTool.should_confirm(&json!({"path": "a"}), &ctx).await.is_none());
    }
}
