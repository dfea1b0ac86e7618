//! Workspace checkpoints in a hidden repository
//!
//! Before a mutating tool call the whole working tree is committed into a
//! private git repository kept under the data directory, never inside the
//! project. A side record per tag keeps the tool call and conversation so a
//! restore can replay them.

mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::ToolCall;

pub use service::{CheckpointService, checkpoint_tag, validate_tag};

/// Errors from snapshot and restore
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("git is not available: {0}")]
    GitUnavailable(String),

    #[error("Git command failed: {0}")]
    GitError(String),

    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Invalid checkpoint tag '{0}' (use letters, digits, '.', '_' or '-')")]
    InvalidTag(String),

    #[error("Checkpoint already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checkpoint record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What a checkpoint remembers; written once, never modified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub tag: String,
    pub commit_hash: String,
    pub tool_call: ToolCall,
    /// Opaque conversation state supplied by the caller
    pub conversation: Value,
    pub created_at: DateTime<Utc>,
}
