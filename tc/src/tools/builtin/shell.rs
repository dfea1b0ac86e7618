//! shell tool - execute shell commands in the project root

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::truncate;
use crate::approval::{ConfirmationKind, ConfirmationRequest};
use crate::tools::process::run_with_cancel;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, ToolSource, check_schema};

/// Output beyond this many bytes is cut
const MAX_OUTPUT: usize = 30_000;

/// Execute a shell command
pub struct ShellTool;

/// Program name a command line starts with, skipping `VAR=value` prefixes
///
/// Used as the allow-list scope, so "always allow" for `git status`
/// also covers `git diff`.
pub fn root_command(command: &str) -> Option<String> {
    command
        .split_whitespace()
        .find(|word| !is_env_assignment(word))
        .map(|word| word.rsplit('/').next().unwrap_or(word).to_string())
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn display_name(&self) -> &str {
        "Shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project root. Use for git, build tools, tests."
    }

    fn parameter_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000)"
                }
            },
            "required": ["command"]
        })
    }

    fn source(&self) -> ToolSource {
        ToolSource::Builtin
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value, _ctx: &ToolContext) -> Result<(), ToolError> {
        check_schema(self, args)?;
        if args["command"].as_str().is_some_and(|c| c.trim().is_empty()) {
            return Err(ToolError::validation(self.name(), "/command", "must not be empty"));
        }
        if args["timeout_ms"].as_i64().is_some_and(|t| t < 1) {
            return Err(ToolError::validation(self.name(), "/timeout_ms", "must be positive"));
        }
        Ok(())
    }

    async fn should_confirm(&self, args: &Value, ctx: &ToolContext) -> Option<ConfirmationRequest> {
        let command = args["command"].as_str().unwrap_or_default();
        let request = ConfirmationRequest::new(
            ConfirmationKind::Exec,
            self.name(),
            format!("Run in {}", ctx.project_root.display()),
            command,
        );
        Some(match root_command(command) {
            Some(root) => request.with_scope(root),
            None => request,
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext, cancel: CancellationToken) -> ToolResult {
        debug!(?args, "ShellTool::execute: called");
        let command = args["command"].as_str().unwrap_or_default();
        let timeout = args["timeout_ms"]
            .as_u64()
            .map(Duration::from_millis)
            .unwrap_or(ctx.shell_timeout);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&ctx.project_root);

        let output = match run_with_cancel(cmd, None, &cancel, timeout).await {
            Ok(output) => output,
            Err(e) => {
                debug!(%e, "ShellTool::execute: failed to execute command");
                return ToolResult::error(format!("Failed to execute command: {}", e));
            }
        };

        if output.cancelled {
            debug!("ShellTool::execute: cancelled");
            return ToolResult::cancelled();
        }
        if output.timed_out {
            debug!("ShellTool::execute: command timed out");
            return ToolResult::error(format!("Command timed out after {}ms", timeout.as_millis()));
        }

        let result = if output.stdout.is_empty() && !output.stderr.is_empty() {
            output.stderr.clone()
        } else if output.stderr.is_empty() {
            output.stdout.clone()
        } else {
            format!("{}\n\nSTDERR:\n{}", output.stdout, output.stderr)
        };
        let truncated = truncate(&result, MAX_OUTPUT, "\n");

        match (output.exit_code, output.signal_name()) {
            (Some(0), _) => {
                debug!("ShellTool::execute: command succeeded");
                ToolResult::success(truncated)
            }
            (_, Some(signal)) => {
                debug!(%signal, "ShellTool::execute: command killed by signal");
                ToolResult::error(format!("Signal: {}\n{}", signal, truncated))
            }
            (code, None) => {
                debug!(?code, "ShellTool::execute: command failed");
                ToolResult::error(format!("Exit code: {}\n{}", code.unwrap_or(-1), truncated))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_shell_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ShellTool
            .execute(json!({"command": "echo hello"}), &ctx, CancellationToken::new())
            .await;

        assert!(!result.is_error);
        assert!(result.display_content.contains("hello"));
    }

    #[tokio::test]
    async fn test_shell_runs_in_project_root() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ShellTool
            .execute(json!({"command": "ls"}), &ctx, CancellationToken::new())
            .await;

        assert!(result.display_content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_shell_failure() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ShellTool
            .execute(json!({"command": "false"}), &ctx, CancellationToken::new())
            .await;

        assert!(result.is_error);
        assert!(result.display_content.contains("Exit code: 1"));
    }

    #[tokio::test]
    async fn test_shell_combines_stderr() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ShellTool
            .execute(json!({"command": "echo out; echo err >&2"}), &ctx, CancellationToken::new())
            .await;

        assert!(!result.is_error);
        assert_eq!(result.display_content, "out\n\n\nSTDERR:\nerr\n");
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ShellTool
            .execute(
                json!({"command": "sleep 30", "timeout_ms": 200}),
                &ctx,
                CancellationToken::new(),
            )
            .await;

        assert!(result.is_error);
        assert!(result.display_content.contains("timed out after 200ms"));
    }

    #[tokio::test]
    async fn test_shell_cancel_terminates_child() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = ShellTool.execute(json!({"command": "sleep 30"}), &ctx, cancel).await;

        assert!(result.is_error);
        assert_eq!(result.display_content, "Tool call was cancelled");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_confirmation_scoped_to_root_command() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let request = ShellTool
            .should_confirm(&json!({"command": "RUST_LOG=debug /usr/bin/git status"}), &ctx)
            .await
            .unwrap();

        assert_eq!(request.kind, ConfirmationKind::Exec);
        assert_eq!(request.scope.as_deref(), Some("git"));
        assert_eq!(request.summary, "RUST_LOG=debug /usr/bin/git status");
    }

    #[test]
    fn test_root_command() {
        assert_eq!(root_command("ls -la").as_deref(), Some("ls"));
        assert_eq!(root_command("  cargo test").as_deref(), Some("cargo"));
        assert_eq!(root_command("A=1 B=2 make").as_deref(), Some("make"));
        assert_eq!(root_command("   "), None);
    }
}
