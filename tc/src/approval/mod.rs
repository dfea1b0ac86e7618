//! Human approval of risky tool calls
//!
//! Tools describe what they are about to do as a [`ConfirmationRequest`];
//! the [`ApprovalController`] decides whether the session's mode already
//! exempts it or whether the external [`ApprovalSurface`] must be asked.

mod controller;
mod surface;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use controller::ApprovalController;
pub use surface::{ApprovalSurface, ChannelApprovalSurface, PendingConfirmation};

/// Session-scoped escalation level
///
/// Ordered `Default < AutoEdit < Yolo`; a session only ever moves up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ApprovalMode {
    /// Every risky call asks
    #[default]
    Default = 0,
    /// File edits run without asking
    AutoEdit = 1,
    /// Nothing asks
    Yolo = 2,
}

impl ApprovalMode {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Default,
            1 => Self::AutoEdit,
            _ => Self::Yolo,
        }
    }

    /// Whether calls of `kind` run without asking in this mode
    pub fn exempts(self, kind: ConfirmationKind) -> bool {
        match self {
            Self::Yolo => true,
            Self::AutoEdit => kind == ConfirmationKind::Edit,
            Self::Default => false,
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AutoEdit => write!(f, "auto-edit"),
            Self::Yolo => write!(f, "yolo"),
        }
    }
}

impl FromStr for ApprovalMode {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "default" => Ok(Self::Default),
            "auto-edit" | "autoedit" => Ok(Self::AutoEdit),
            "yolo" => Ok(Self::Yolo),
            _ => Err(ApprovalError::UnknownMode(s.to_string())),
        }
    }
}

/// What a call needing confirmation is about to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationKind {
    /// Run a command
    Exec,
    /// Modify a file
    Edit,
    /// Reach out for information (network fetches)
    Info,
    /// Invoke a tool on an external server
    ProtocolCall,
}

impl ConfirmationKind {
    /// Mode that stops asking for this kind after an unscoped "always"
    pub fn implied_mode(self) -> ApprovalMode {
        match self {
            Self::Edit => ApprovalMode::AutoEdit,
            Self::Exec | Self::Info | Self::ProtocolCall => ApprovalMode::Yolo,
        }
    }
}

impl fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Edit => write!(f, "edit"),
            Self::Info => write!(f, "info"),
            Self::ProtocolCall => write!(f, "protocol-call"),
        }
    }
}

/// A pending decision surfaced to the human
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub kind: ConfirmationKind,
    pub tool_name: String,
    /// Short headline, e.g. "Edit src/main.rs"
    pub title: String,
    /// Details to show: a diff, the command line, the url
    pub summary: String,
    /// Allow-list key for "always allow" (root command, server name, tool name)
    pub scope: Option<String>,
}

impl ConfirmationRequest {
    pub fn new(
        kind: ConfirmationKind,
        tool_name: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            tool_name: tool_name.into(),
            title: title.into(),
            summary: summary.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// The human's decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationOutcome {
    ProceedOnce,
    ProceedAlways,
    Cancel,
}

impl ConfirmationOutcome {
    pub fn proceeds(self) -> bool {
        !matches!(self, Self::Cancel)
    }
}

/// Approval errors
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Unknown approval mode '{0}' (expected default, auto-edit or yolo)")]
    UnknownMode(String),
}
