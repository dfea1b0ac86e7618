//! CLI command definitions for `tc`

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::approval::ApprovalMode;

/// tc - drive the tool execution core from a shell
#[derive(Parser)]
#[command(
    name = "tc",
    about = "Discover, inspect and run agent tools with approvals and checkpoints",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Project root (defaults to the current directory)
    #[arg(short, long, global = true, help = "Project root (default: current directory)")]
    pub project: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover and list every available tool
    Tools {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Discover and show protocol server statuses
    Servers {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run one tool call, asking for confirmation on this terminal
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Approval mode for this call (overrides config)
        #[arg(short, long, value_enum)]
        mode: Option<ApprovalMode>,
    },

    /// List checkpoints for the project
    Checkpoints {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Restore the project to a checkpoint
    Restore {
        /// Checkpoint tag
        tag: String,
    },
}

/// Output format for listing commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolcore")
        .join("logs")
        .join("toolcore.log")
}

/// Version of git on PATH, if any
fn git_version() -> Option<String> {
    let output = std::process::Command::new("git").arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .find(|w| w.starts_with(|c: char| c.is_ascii_digit()))
        .map(|w| w.to_string())
}

/// Generate the after_help text with the git check and log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::from("Required Tools:\n");
    match git_version() {
        Some(version) => help.push_str(&format!("  \u{2705} {:<10} {}\n", "git", version)),
        None => help.push_str(&format!("  \u{274C} {:<10} not found (checkpoints unavailable)\n", "git")),
    }
    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
