//! tc - tool execution core CLI
//!
//! Discovers tools, runs single calls with terminal confirmation, and
//! lists or restores checkpoints.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, bail};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use toolcore::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use toolcore::config::Config;
use toolcore::{
    ApprovalMode, ApprovalSurface, CallOutcome, CheckpointService, ConfirmationKind, ConfirmationOutcome,
    ConfirmationRequest, Session, ToolCall,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Asks on stderr and reads the answer from stdin
struct TerminalApprovalSurface;

#[async_trait]
impl ApprovalSurface for TerminalApprovalSurface {
    async fn confirm(&self, request: ConfirmationRequest) -> ConfirmationOutcome {
        debug!(tool = %request.tool_name, "TerminalApprovalSurface::confirm: called");
        let kind = match request.kind {
            ConfirmationKind::Edit => "edit".yellow(),
            ConfirmationKind::Exec => "exec".red(),
            ConfirmationKind::Info => "info".cyan(),
            ConfirmationKind::ProtocolCall => "mcp".magenta(),
        };
        eprintln!("\n[{}] {}", kind, request.title.bold());
        for line in request.summary.lines() {
            let line = if line.starts_with('+') && !line.starts_with("+++") {
                line.green()
            } else if line.starts_with('-') && !line.starts_with("---") {
                line.red()
            } else {
                line.normal()
            };
            eprintln!("  {}", line);
        }
        let always = match &request.scope {
            Some(scope) => format!("always allow {}", scope),
            None => "always".to_string(),
        };
        eprint!("Proceed? [y]es / [a] {} / [N]o: ", always);
        let _ = std::io::stderr().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => match line.trim().to_lowercase().as_str() {
                "y" | "yes" => ConfirmationOutcome::ProceedOnce,
                "a" | "always" => ConfirmationOutcome::ProceedAlways,
                _ => ConfirmationOutcome::Cancel,
            },
            _ => ConfirmationOutcome::Cancel,
        }
    }
}

fn project_root(cli_project: Option<&PathBuf>) -> Result<PathBuf> {
    match cli_project {
        Some(path) => Ok(path.clone()),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

async fn start_session(config: &Config, project: &Path) -> Result<Session> {
    Session::start(config, project, Arc::new(TerminalApprovalSurface))
        .await
        .context("Failed to start session")
}

async fn cmd_tools(config: &Config, project: &Path, format: OutputFormat) -> Result<()> {
    debug!("cmd_tools: called");
    let session = start_session(config, project).await?;

    match format {
        OutputFormat::Json => {
            let tools: Vec<Value> = session
                .registry()
                .list()
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name(),
                        "display-name": t.display_name(),
                        "source": t.source().to_string(),
                        "mutating": t.is_mutating(),
                        "description": t.description(),
                        "input-schema": t.parameter_schema(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        OutputFormat::Text => {
            for tool in session.registry().list() {
                println!(
                    "{:<32} {:<16} {}",
                    tool.name().bold(),
                    tool.source().to_string().cyan(),
                    tool.description().lines().next().unwrap_or_default()
                );
            }
            let summary = session.discovery();
            if let Some(error) = &summary.subprocess_error {
                eprintln!("{} subprocess discovery: {}", "warning:".yellow(), error);
            }
            for (server, error) in &summary.failed_servers {
                eprintln!("{} server {}: {}", "warning:".yellow(), server, error);
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn cmd_servers(config: &Config, project: &Path, format: OutputFormat) -> Result<()> {
    debug!("cmd_servers: called");
    let session = start_session(config, project).await?;
    let statuses = session.mcp().statuses().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Text => {
            if statuses.is_empty() {
                println!("No protocol servers configured");
            }
            for server in &statuses {
                let status = match server.status {
                    toolcore::ServerStatus::Connected => server.status.to_string().green(),
                    toolcore::ServerStatus::Connecting => server.status.to_string().yellow(),
                    toolcore::ServerStatus::Disconnected => server.status.to_string().red(),
                };
                println!("{:<24} {:<14} {} tools", server.name.bold(), status, server.tool_names.len());
                if let Some(error) = &server.last_error {
                    println!("  {}", error.dimmed());
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn cmd_call(
    config: &Config,
    project: &Path,
    name: &str,
    args: &str,
    mode: Option<ApprovalMode>,
) -> Result<()> {
    debug!(%name, ?mode, "cmd_call: called");
    let args: Value = serde_json::from_str(args).context("--args must be a JSON object")?;

    let mut config = config.clone();
    if let Some(mode) = mode {
        config.approval.mode = mode;
    }
    let session = start_session(&config, project).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let call = ToolCall::new(name, args);
    let outcome = session.call(&call, &Value::Null, cancel).await;
    session.shutdown().await;

    match outcome {
        CallOutcome::Completed { result, checkpoint } => {
            if let Some(tag) = checkpoint {
                eprintln!("{} {}", "checkpoint:".dimmed(), tag);
            }
            if result.is_error {
                eprintln!("{}", result.display_content.red());
                bail!("Tool {} reported an error", name);
            }
            println!("{}", result.display_content);
            Ok(())
        }
        CallOutcome::Declined { tool } => {
            eprintln!("{} {}", "Declined:".yellow(), tool);
            Ok(())
        }
        CallOutcome::Rejected(e) => bail!("Rejected: {}", e),
        CallOutcome::Aborted(e) => bail!("Aborted: {}", e),
    }
}

async fn cmd_checkpoints(config: &Config, project: &Path, format: OutputFormat) -> Result<()> {
    debug!("cmd_checkpoints: called");
    let service = CheckpointService::new(&config.checkpoint.data_dir, project);
    let tags = service.list().await?;

    match format {
        OutputFormat::Json => {
            let mut records = Vec::new();
            for tag in &tags {
                records.push(service.get(tag).await?);
            }
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Text => {
            if tags.is_empty() {
                println!("No checkpoints for {}", service.project_root().display());
            }
            for tag in &tags {
                let record = service.get(tag).await?;
                println!(
                    "{}  {}  {}",
                    record.tag.bold(),
                    record.tool_call.name.cyan(),
                    &record.commit_hash[..record.commit_hash.len().min(12)]
                );
            }
        }
    }
    Ok(())
}

async fn cmd_restore(config: &Config, project: &Path, tag: &str) -> Result<()> {
    debug!(%tag, "cmd_restore: called");
    let service = CheckpointService::new(&config.checkpoint.data_dir, project);
    let record = service
        .restore(tag)
        .await
        .context(format!("Failed to restore checkpoint {}", tag))?;

    eprintln!("{} {}", "Restored".green(), record.tag);
    println!("{}", serde_json::to_string_pretty(&record.tool_call)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let project = project_root(cli.project.as_ref())?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Tools { format } => cmd_tools(&config, &project, format).await,
        Command::Servers { format } => cmd_servers(&config, &project, format).await,
        Command::Call { name, args, mode } => cmd_call(&config, &project, &name, &args, mode).await,
        Command::Checkpoints { format } => cmd_checkpoints(&config, &project, format).await,
        Command::Restore { tag } => cmd_restore(&config, &project, &tag).await,
    }
}
