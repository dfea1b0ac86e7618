//! toolcore configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::approval::ApprovalMode;

/// Main toolcore configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Subprocess tool discovery and built-in tool selection
    pub tools: ToolsConfig,

    /// External protocol servers, keyed by server name
    #[serde(rename = "mcp-servers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    /// Approval defaults
    pub approval: ApprovalConfig,

    /// Checkpointing of the workspace before mutating calls
    pub checkpoint: CheckpointConfig,

    /// Built-in shell tool settings
    pub shell: ShellConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .toolcore.yml
        let local_config = PathBuf::from(".toolcore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/toolcore/toolcore.yml
        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: a broken config file is reported properly by `load` later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".toolcore.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("toolcore").join("toolcore.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Subprocess discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Shell command printing a JSON array of tool declarations
    #[serde(rename = "discovery-command")]
    pub discovery_command: Option<String>,

    /// Executable invoked as `<call-command> <tool-name>` for discovered tools
    #[serde(rename = "call-command")]
    pub call_command: Option<String>,

    /// Timeout for the discovery command in milliseconds
    #[serde(rename = "discovery-timeout-ms")]
    pub discovery_timeout_ms: u64,

    /// Timeout for a single discovered-tool call in milliseconds
    #[serde(rename = "call-timeout-ms")]
    pub call_timeout_ms: u64,

    /// Built-in tools that should not be registered
    pub exclude: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            discovery_command: None,
            call_command: None,
            discovery_timeout_ms: 30_000,
            call_timeout_ms: 600_000,
            exclude: Vec::new(),
        }
    }
}

impl ToolsConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Spawn configuration for one external protocol server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Executable to launch
    pub command: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables for the server process
    pub env: HashMap<String, String>,

    /// Working directory (defaults to the project root)
    pub cwd: Option<PathBuf>,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Spawn + handshake + listing timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Trusted servers never ask for confirmation
    pub trust: bool,

    /// Only register these tools (empty = all)
    #[serde(rename = "include-tools")]
    pub include_tools: Vec<String>,

    /// Never register these tools
    #[serde(rename = "exclude-tools")]
    pub exclude_tools: Vec<String>,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout_ms: 600_000,
            connect_timeout_ms: 30_000,
            trust: false,
            include_tools: Vec::new(),
            exclude_tools: Vec::new(),
        }
    }
}

impl McpServerConfig {
    /// Config for `command args...` with everything else defaulted
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Default::default()
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether a tool passes the include/exclude filters
    pub fn allows_tool(&self, name: &str) -> bool {
        if self.exclude_tools.iter().any(|t| t == name) {
            return false;
        }
        self.include_tools.is_empty() || self.include_tools.iter().any(|t| t == name)
    }
}

/// Approval defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Initial approval mode for new sessions
    pub mode: ApprovalMode,
}

/// Checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Snapshot the workspace before mutating calls
    pub enabled: bool,

    /// Private data directory holding hidden repositories and records
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Abort a mutating call when its snapshot fails
    #[serde(rename = "fail-closed")]
    pub fail_closed: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/toolcore on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("toolcore"))
            .unwrap_or_else(|| PathBuf::from(".toolcore"));

        Self {
            enabled: false,
            data_dir,
            fail_closed: true,
        }
    }
}

/// Built-in shell tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Default command timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self { timeout_ms: 120_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.tools.discovery_command.is_none());
        assert_eq!(config.tools.discovery_timeout_ms, 30_000);
        assert!(config.mcp_servers.is_empty());
        assert_eq!(config.approval.mode, ApprovalMode::Default);
        assert!(!config.checkpoint.enabled);
        assert!(config.checkpoint.fail_closed);
        assert_eq!(config.shell.timeout_ms, 120_000);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

tools:
  discovery-command: ./bin/discover
  call-command: ./bin/call
  discovery-timeout-ms: 5000
  exclude: [web_fetch]

mcp-servers:
  github:
    command: github-mcp
    args: ["--stdio"]
    env:
      TOKEN: abc
    trust: true
    exclude-tools: [delete_repo]
  files:
    command: fs-server
    timeout-ms: 1000

approval:
  mode: auto-edit

checkpoint:
  enabled: true
  data-dir: /tmp/toolcore-data
  fail-closed: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.tools.discovery_command.as_deref(), Some("./bin/discover"));
        assert_eq!(config.tools.call_command.as_deref(), Some("./bin/call"));
        assert_eq!(config.tools.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(config.tools.exclude, vec!["web_fetch".to_string()]);

        let github = &config.mcp_servers["github"];
        assert_eq!(github.command, "github-mcp");
        assert_eq!(github.args, vec!["--stdio".to_string()]);
        assert_eq!(github.env.get("TOKEN").map(String::as_str), Some("abc"));
        assert!(github.trust);
        assert!(!github.allows_tool("delete_repo"));
        assert!(github.allows_tool("list_issues"));

        let files = &config.mcp_servers["files"];
        assert_eq!(files.call_timeout(), Duration::from_secs(1));
        assert_eq!(files.connect_timeout(), Duration::from_secs(30));

        assert_eq!(config.approval.mode, ApprovalMode::AutoEdit);
        assert!(config.checkpoint.enabled);
        assert_eq!(config.checkpoint.data_dir, PathBuf::from("/tmp/toolcore-data"));
        assert!(!config.checkpoint.fail_closed);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
shell:
  timeout-ms: 1000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.shell.timeout_ms, 1000);

        // Defaults for unspecified
        assert_eq!(config.tools.call_timeout_ms, 600_000);
        assert_eq!(config.approval.mode, ApprovalMode::Default);
        assert!(config.checkpoint.fail_closed);
    }

    #[test]
    fn test_include_tools_filter() {
        let mut server = McpServerConfig::new("srv", vec![]);
        server.include_tools = vec!["a".to_string()];

        assert!(server.allows_tool("a"));
        assert!(!server.allows_tool("b"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("toolcore.yml");
        fs::write(&path, "approval:\n  mode: yolo\nlog-level: WARN\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.approval.mode, ApprovalMode::Yolo);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/toolcore.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
