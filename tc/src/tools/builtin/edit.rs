//! edit tool - replace strings in a file

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::diff::unified_diff;
use crate::approval::{ConfirmationKind, ConfirmationRequest};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, ToolSource, check_schema};

/// How long a confirmation-time edit stays reusable
pub const PREPARED_EDIT_TTL: Duration = Duration::from_secs(30);

/// Replace a specific string in a file
pub struct EditTool {
    prepared: Mutex<Option<PreparedEdit>>,
    ttl: Duration,
}

/// Edit computed while building the confirmation
#[derive(Debug, Clone)]
struct PreparedEdit {
    key: EditKey,
    original: String,
    new_content: String,
    prepared_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EditKey {
    path: PathBuf,
    old_string: String,
    new_string: String,
    replace_all: bool,
}

impl EditKey {
    fn from_args(path: PathBuf, args: &Value) -> Self {
        Self {
            path,
            old_string: args["old_string"].as_str().unwrap_or_default().to_string(),
            new_string: args["new_string"].as_str().unwrap_or_default().to_string(),
            replace_all: args["replace_all"].as_bool().unwrap_or(false),
        }
    }
}

impl EditTool {
    pub fn new() -> Self {
        Self {
            prepared: Mutex::new(None),
            ttl: PREPARED_EDIT_TTL,
        }
    }

    /// Override how long a prepared edit is reused
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Prepared content for `key`, if still fresh and the file is unchanged
    async fn take_prepared(&self, key: &EditKey, current: &str) -> Option<String> {
        let prepared = self.prepared.lock().await.take()?;
        if prepared.key != *key {
            debug!("EditTool::take_prepared: different edit, discarding");
            return None;
        }
        if prepared.prepared_at.elapsed() >= self.ttl {
            debug!("EditTool::take_prepared: stale, recomputing");
            return None;
        }
        if prepared.original != current {
            debug!("EditTool::take_prepared: file changed since confirmation");
            return None;
        }
        Some(prepared.new_content)
    }
}

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the replacement, returning the new content and replacement count
fn apply_edit(content: &str, old_string: &str, new_string: &str, replace_all: bool) -> Result<(String, usize), String> {
    let count = content.matches(old_string).count();
    if count == 0 {
        return Err("old_string not found in file. Make sure it matches exactly including whitespace.".to_string());
    }
    if !replace_all && count > 1 {
        return Err(format!(
            "old_string found {} times. Use replace_all=true or provide more context.",
            count
        ));
    }

    if replace_all {
        Ok((content.replace(old_string, new_string), count))
    } else {
        Ok((content.replacen(old_string, new_string, 1), 1))
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn display_name(&self) -> &str {
        "Edit"
    }

    fn description(&self) -> &str {
        "Replace a specific string in a file. old_string must match exactly and be unique unless replace_all is set."
    }

    fn parameter_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
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
        ctx.validate_path(Path::new(args["path"].as_str().unwrap_or_default()))?;

        let old_string = args["old_string"].as_str().unwrap_or_default();
        if old_string.is_empty() {
            return Err(ToolError::validation(self.name(), "/old_string", "must not be empty"));
        }
        if args["new_string"].as_str() == Some(old_string) {
            return Err(ToolError::validation(
                self.name(),
                "/new_string",
                "must differ from old_string",
            ));
        }
        Ok(())
    }

    async fn should_confirm(&self, args: &Value, ctx: &ToolContext) -> Option<ConfirmationRequest> {
        let path = args["path"].as_str().unwrap_or_default();
        let full_path = ctx.validate_path(Path::new(path)).ok()?;
        let key = EditKey::from_args(full_path.clone(), args);

        // Failures surface from execute; nothing to confirm
        let original = tokio::fs::read_to_string(&full_path).await.ok()?;
        let (new_content, count) = apply_edit(&original, &key.old_string, &key.new_string, key.replace_all).ok()?;

        let diff = unified_diff(&ctx.display_path(&full_path), &original, &new_content);
        debug!(%path, count, "EditTool::should_confirm: prepared edit");

        *self.prepared.lock().await = Some(PreparedEdit {
            key,
            original,
            new_content,
            prepared_at: Instant::now(),
        });

        Some(ConfirmationRequest::new(
            ConfirmationKind::Edit,
            self.name(),
            format!("Edit {}", path),
            diff,
        ))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext, _cancel: CancellationToken) -> ToolResult {
        debug!(?args, "EditTool::execute: called");
        let path = args["path"].as_str().unwrap_or_default();

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let key = EditKey::from_args(full_path.clone(), &args);

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(%e, "EditTool::execute: failed to read file");
                return ToolResult::error(format!("Failed to read file: {}", e));
            }
        };

        let (new_content, count) = match self.take_prepared(&key, &content).await {
            Some(new_content) => {
                debug!("EditTool::execute: reusing prepared edit");
                let count = if key.replace_all {
                    content.matches(key.old_string.as_str()).count()
                } else {
                    1
                };
                (new_content, count)
            }
            None => match apply_edit(&content, &key.old_string, &key.new_string, key.replace_all) {
                Ok(edit) => edit,
                Err(msg) => return ToolResult::error(msg),
            },
        };

        if let Err(e) = tokio::fs::write(&full_path, &new_content).await {
            debug!(%e, "EditTool::execute: failed to write file");
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        debug!(count, "EditTool::execute: edit applied");
        ToolResult::success(format!("Replaced {} occurrence(s) in {}", count, path))
    }
}
