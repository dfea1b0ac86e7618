//! Tools discovered from a local discovery command
//!
//! The discovery command prints a JSON array of declaration groups; each
//! discovered tool is called as `<call-command> <tool-name>` with its JSON
//! arguments on stdin.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::process::{ProcessOutput, run_with_cancel};
use super::schema::sanitize_schema;
use super::{Tool, ToolContext, ToolResult, ToolSource};

/// A failing discovery source; logged and skipped, never fatal
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to run discovery command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Discovery command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Discovery command exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Discovery output is not a JSON array of tool declarations: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One `{name, description, parameters}` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiscoveryEntry {
    Group { function_declarations: Vec<FunctionDeclaration> },
    Bare(FunctionDeclaration),
}

/// Parse discovery stdout into declarations
pub fn parse_declarations(stdout: &str) -> Result<Vec<FunctionDeclaration>, DiscoveryError> {
    debug!(len = stdout.len(), "subprocess::parse_declarations: called");
    let entries: Vec<DiscoveryEntry> = serde_json::from_str(stdout.trim())?;

    Ok(entries
        .into_iter()
        .flat_map(|entry| match entry {
            DiscoveryEntry::Group { function_declarations } => function_declarations,
            DiscoveryEntry::Bare(decl) => vec![decl],
        })
        .collect())
}

/// Run the discovery command through `sh -c` and wrap what it declares
pub async fn discover_subprocess_tools(
    discovery_command: &str,
    call_command: &str,
    project_root: &Path,
    discovery_timeout: Duration,
    call_timeout: Duration,
) -> Result<Vec<SubprocessTool>, DiscoveryError> {
    debug!(%discovery_command, ?discovery_timeout, "discover_subprocess_tools: called");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(discovery_command).current_dir(project_root);

    // Nothing cancels discovery except its own timeout
    let never = CancellationToken::new();
    let output = run_with_cancel(cmd, None, &never, discovery_timeout).await?;

    if output.timed_out {
        return Err(DiscoveryError::Timeout(discovery_timeout));
    }
    if !output.success() {
        return Err(DiscoveryError::Failed {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    let tools: Vec<SubprocessTool> = parse_declarations(&output.stdout)?
        .into_iter()
        .map(|decl| SubprocessTool::new(decl, call_command, call_timeout))
        .collect();

    info!(count = tools.len(), "Discovered subprocess tools");
    Ok(tools)
}

/// Adapter running a discovered tool through the call command
#[derive(Debug, Clone)]
pub struct SubprocessTool {
    name: String,
    description: String,
    schema: Value,
    call_command: String,
    timeout: Duration,
}

impl SubprocessTool {
    pub fn new(decl: FunctionDeclaration, call_command: impl Into<String>, timeout: Duration) -> Self {
        debug!(name = %decl.name, "SubprocessTool::new: called");
        Self {
            schema: sanitize_schema(&decl.parameters),
            name: decl.name,
            description: decl.description,
            call_command: call_command.into(),
            timeout,
        }
    }

    /// Structured failure payload fed back to the model
    fn failure_payload(output: &ProcessOutput, error: Option<&str>) -> Value {
        json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
            "signal": output.signal_name(),
            "error": error,
        })
    }
}

#[async_trait]
impl Tool for SubprocessTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> Value {
        self.schema.clone()
    }

    fn source(&self) -> ToolSource {
        ToolSource::Subprocess
    }

    // Discovered tools are opaque; assume they can touch the workspace
    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext, cancel: CancellationToken) -> ToolResult {
        debug!(tool = %self.name, "SubprocessTool::execute: called");
        let mut cmd = Command::new(&self.call_command);
        cmd.arg(&self.name).current_dir(&ctx.project_root);

        let input = args.to_string().into_bytes();
        let output = match run_with_cancel(cmd, Some(input), &cancel, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                debug!(%e, "SubprocessTool::execute: failed to spawn call command");
                let payload = Self::failure_payload(&ProcessOutput::default(), Some(&e.to_string()));
                return ToolResult::structured(
                    payload,
                    format!("Failed to run {} {}: {}", self.call_command, self.name, e),
                    true,
                );
            }
        };

        if output.cancelled {
            debug!("SubprocessTool::execute: cancelled");
            return ToolResult::cancelled();
        }

        if output.success() && output.stderr.trim().is_empty() {
            debug!("SubprocessTool::execute: succeeded");
            return ToolResult::success(output.stdout);
        }

        let error = output.timed_out.then(|| format!("Timed out after {:?}", self.timeout));
        let summary = match (&error, output.exit_code, output.signal_name()) {
            (Some(e), _, _) => e.clone(),
            (None, _, Some(sig)) => format!("Terminated by {}", sig),
            (None, Some(0), None) => format!("Wrote to stderr: {}", output.stderr.trim()),
            (None, code, None) => format!("Exit code: {}\n{}", code.unwrap_or(-1), output.stderr.trim()),
        };
        debug!(%summary, "SubprocessTool::execute: failed");
        ToolResult::structured(Self::failure_payload(&output, error.as_deref()), summary, true)
    }
}
