//! ToolContext - execution context for tools

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::ToolError;

/// Default shell command timeout
const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// Execution context shared by every tool call in a session
///
/// File operations are confined to `project_root` unless the sandbox is
/// disabled.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Project root - all file ops constrained here
    pub project_root: PathBuf,

    /// Session identifier (for logs and checkpoint records)
    pub session_id: String,

    /// Whether sandbox mode is enabled (default: true)
    pub sandbox_enabled: bool,

    /// Default timeout for the shell tool
    pub shell_timeout: Duration,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(project_root: PathBuf, session_id: String) -> Self {
        debug!(?project_root, %session_id, "ToolContext::new: called");
        Self {
            project_root,
            session_id,
            sandbox_enabled: true,
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Create a context with sandbox disabled (for testing)
    pub fn new_unsandboxed(project_root: PathBuf, session_id: String) -> Self {
        debug!(?project_root, %session_id, "ToolContext::new_unsandboxed: called");
        Self {
            sandbox_enabled: false,
            ..Self::new(project_root, session_id)
        }
    }

    /// Builder method to set the shell timeout
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    /// Resolve a path relative to the project root, dropping `.` and `..`
    pub fn normalize_path(&self, path: &Path) -> PathBuf {
        debug!(?path, "ToolContext::normalize_path: called");
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }
        normalized
    }

    /// Validate path is within the project root (sandbox enforcement)
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "ToolContext::validate_path: called");
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            debug!("ToolContext::validate_path: sandbox disabled, returning normalized path");
            return Ok(normalized);
        }

        // Existing paths are canonicalized to resolve symlinks; new files are
        // checked through their nearest existing ancestor.
        let canonical = resolve_existing_prefix(&normalized);
        let root_canonical = self
            .project_root
            .canonicalize()
            .unwrap_or_else(|_| self.project_root.clone());

        if canonical.starts_with(&root_canonical) {
            debug!("ToolContext::validate_path: path is within project root");
            Ok(canonical)
        } else {
            debug!("ToolContext::validate_path: sandbox violation detected");
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                root: self.project_root.clone(),
            })
        }
    }

    /// Path relative to the project root, for display
    pub fn display_path(&self, path: &Path) -> String {
        let root = self
            .project_root
            .canonicalize()
            .unwrap_or_else(|_| self.project_root.clone());
        path.strip_prefix(&root)
            .or_else(|_| path.strip_prefix(&self.project_root))
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();

    while !existing.exists() {
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_path_within_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().to_path_buf();
        fs::write(root.join("test.txt"), "content").unwrap();

        let ctx = ToolContext::new(root, "test-session".to_string());

        assert!(ctx.validate_path(Path::new("test.txt")).is_ok());
    }

    #[test]
    fn test_validate_path_outside_root() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(matches!(result.unwrap_err(), ToolError::SandboxViolation { .. }));
    }

    #[test]
    fn test_validate_path_parent_escape() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        assert!(ctx.validate_path(Path::new("../outside.txt")).is_err());
        assert!(ctx.validate_path(Path::new("sub/../../outside.txt")).is_err());
    }

    #[test]
    fn test_validate_path_with_sandbox_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf(), "test-session".to_string());

        assert!(ctx.validate_path(Path::new("/etc/passwd")).is_ok());
    }

    #[test]
    fn test_validate_new_nested_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        let path = ctx.validate_path(Path::new("new/dir/file.txt")).unwrap();
        assert!(path.ends_with("new/dir/file.txt"));
    }

    #[test]
    fn test_display_path_is_relative() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        let path = ctx.validate_path(Path::new("a/b.txt")).unwrap();
        assert_eq!(ctx.display_path(&path), "a/b.txt");
    }
}
