//! Integration tests for toolcore
//!
//! These drive a whole `Session`: discovery from every backend, approvals,
//! checkpoints and cancellation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use toolcore::config::Config;
use toolcore::{
    ApprovalMode, CallOutcome, ChannelApprovalSurface, ConfirmationKind, ConfirmationOutcome, McpServerConfig,
    ServerStatus, Session, ToolCall,
};

use common::{FOO_DISCOVERY, call_script, mock_server};

/// Surface whose requests nobody answers; fine for Yolo sessions
fn unanswered_surface() -> Arc<ChannelApprovalSurface> {
    let (surface, _rx) = ChannelApprovalSurface::new(1);
    Arc::new(surface)
}

fn full_config(scripts: &TempDir) -> Config {
    let mut config = Config::default();
    config.approval.mode = ApprovalMode::Yolo;
    config.tools.discovery_command = Some(FOO_DISCOVERY.to_string());
    config.tools.call_command = Some(call_script(scripts.path()));
    config.mcp_servers.insert("alpha".to_string(), mock_server(scripts, "alpha"));
    config.mcp_servers.insert("beta".to_string(), mock_server(scripts, "beta"));
    config.mcp_servers.insert(
        "broken".to_string(),
        McpServerConfig::new("/nonexistent/tool-server", vec![]),
    );
    config
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_session_discovers_every_backend() {
    let project = TempDir::new().expect("Failed to create temp dir");
    let scripts = TempDir::new().expect("Failed to create temp dir");
    let config = full_config(&scripts);

    let session = Session::start(&config, project.path(), unanswered_surface())
        .await
        .expect("Session should start despite a broken server");

    let names: Vec<String> = session.registry().list().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(
        names,
        vec![
            "alpha_echo",
            "alpha_slow",
            "beta_echo",
            "beta_slow",
            "edit",
            "foo",
            "read_file",
            "shell",
            "web_fetch",
            "write_file",
        ]
    );

    let summary = session.discovery();
    assert_eq!(summary.subprocess_tools, 1);
    assert_eq!(summary.server_tools.get("alpha"), Some(&2));
    assert_eq!(summary.server_tools.get("beta"), Some(&2));
    assert_eq!(summary.failed_servers.len(), 1);
    assert_eq!(summary.failed_servers[0].0, "broken");

    assert_eq!(session.mcp().status("alpha").await, Some(ServerStatus::Connected));
    assert_eq!(session.mcp().status("broken").await, Some(ServerStatus::Disconnected));

    session.shutdown().await;
}

#[tokio::test]
async fn test_rediscovery_is_idempotent() {
    let project = TempDir::new().unwrap();
    let scripts = TempDir::new().unwrap();
    let mut session = Session::start(&full_config(&scripts), project.path(), unanswered_surface())
        .await
        .unwrap();
    let before = session.registry().len();

    session.rediscover().await;
    session.rediscover().await;

    assert_eq!(session.registry().len(), before);
    assert_eq!(session.registry().tools_for_server("alpha").len(), 2);
    session.shutdown().await;
}

// =============================================================================
// Calls through every backend
// =============================================================================

#[tokio::test]
async fn test_calls_reach_subprocess_and_protocol_tools() {
    let project = TempDir::new().unwrap();
    let scripts = TempDir::new().unwrap();
    let session = Session::start(&full_config(&scripts), project.path(), unanswered_surface())
        .await
        .unwrap();

    let foo = session
        .call(&ToolCall::new("foo", json!({"x": 1})), &json!(null), CancellationToken::new())
        .await
        .into_result();
    assert!(!foo.is_error, "{}", foo.display_content);
    assert_eq!(foo.raw_text().trim(), r#"called foo with {"x":1}"#);

    let echo = session
        .call(
            &ToolCall::new("beta_echo", json!({"msg": "hi"})),
            &json!(null),
            CancellationToken::new(),
        )
        .await
        .into_result();
    assert!(!echo.is_error);
    assert_eq!(echo.display_content, "echo from beta");

    session.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_protocol_call_returns_promptly() {
    let project = TempDir::new().unwrap();
    let scripts = TempDir::new().unwrap();
    let session = Session::start(&full_config(&scripts), project.path(), unanswered_surface())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = session
        .call(&ToolCall::new("alpha_slow", json!({})), &json!(null), cancel)
        .await
        .into_result();

    assert!(result.is_error);
    assert_eq!(result.display_content, "Tool call was cancelled");
    assert!(started.elapsed() < Duration::from_secs(5));

    // The connection survives the abandoned request
    let echo = session
        .call(&ToolCall::new("alpha_echo", json!({})), &json!(null), CancellationToken::new())
        .await
        .into_result();
    assert_eq!(echo.display_content, "echo from alpha");

    session.shutdown().await;
}

#[tokio::test]
async fn test_invalid_args_rejected_before_execution() {
    let project = TempDir::new().unwrap();
    let session = Session::start(&Config::default(), project.path(), unanswered_surface())
        .await
        .unwrap();

    let outcome = session
        .call(
            &ToolCall::new("write_file", json!({"path": "x.txt"})),
            &json!(null),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(outcome, CallOutcome::Rejected(_)));
    assert!(!project.path().join("x.txt").exists());
}

// =============================================================================
// Approvals
// =============================================================================

#[tokio::test]
async fn test_proceed_always_on_edit_skips_later_edits() {
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join("a.txt"), "one\n").unwrap();

    let (surface, mut rx) = ChannelApprovalSurface::new(4);
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = asked.clone();
    tokio::spawn(async move {
        while let Some(pending) = rx.recv().await {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(pending.request.kind, ConfirmationKind::Edit);
            pending.respond(ConfirmationOutcome::ProceedAlways);
        }
    });

    let session = Session::start(&Config::default(), project.path(), Arc::new(surface))
        .await
        .unwrap();

    for (old, new) in [("one", "two"), ("two", "three")] {
        let outcome = session
            .call(
                &ToolCall::new("edit", json!({"path": "a.txt", "old_string": old, "new_string": new})),
                &json!(null),
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_completed());
    }

    assert_eq!(std::fs::read_to_string(project.path().join("a.txt")).unwrap(), "three\n");
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(session.approval().mode(), ApprovalMode::AutoEdit);
}

#[tokio::test]
async fn test_declined_call_has_no_side_effects() {
    let project = TempDir::new().unwrap();
    let (surface, mut rx) = ChannelApprovalSurface::new(1);
    tokio::spawn(async move {
        while let Some(pending) = rx.recv().await {
            pending.respond(ConfirmationOutcome::Cancel);
        }
    });

    let session = Session::start(&Config::default(), project.path(), Arc::new(surface))
        .await
        .unwrap();
    let outcome = session
        .call(
            &ToolCall::new("shell", json!({"command": "touch made.txt"})),
            &json!(null),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(outcome, CallOutcome::Declined { .. }));
    assert!(!project.path().join("made.txt").exists());
}

// =============================================================================
// Checkpoints
// =============================================================================

#[tokio::test]
async fn test_checkpoint_and_restore_round_trip() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(project.path().join("notes.txt"), "original\n").unwrap();

    let mut config = Config::default();
    config.approval.mode = ApprovalMode::Yolo;
    config.checkpoint.enabled = true;
    config.checkpoint.data_dir = data.path().to_path_buf();

    let session = Session::start(&config, project.path(), unanswered_surface())
        .await
        .unwrap();

    let edit = ToolCall::new(
        "edit",
        json!({"path": "notes.txt", "old_string": "original", "new_string": "changed"}),
    );
    let conversation = json!([{"role": "user", "content": "change the notes"}]);
    let CallOutcome::Completed { checkpoint, .. } = session.call(&edit, &conversation, CancellationToken::new()).await
    else {
        panic!("edit should complete");
    };
    let first = checkpoint.expect("edit should be checkpointed");

    let create = ToolCall::new("write_file", json!({"path": "extra.txt", "content": "new"}));
    session.call(&create, &conversation, CancellationToken::new()).await;

    let service = session.checkpoints().unwrap();
    assert_eq!(service.list().await.unwrap().len(), 2);

    let record = session.executor().restore(&first).await.unwrap();
    assert_eq!(record.tool_call, edit);
    assert_eq!(record.conversation, conversation);
    assert_eq!(
        std::fs::read_to_string(project.path().join("notes.txt")).unwrap(),
        "original\n"
    );
    assert!(!project.path().join("extra.txt").exists());
}

#[tokio::test]
async fn test_read_only_calls_are_not_checkpointed() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(project.path().join("a.txt"), "x").unwrap();

    let mut config = Config::default();
    config.checkpoint.enabled = true;
    config.checkpoint.data_dir = data.path().to_path_buf();

    let session = Session::start(&config, project.path(), unanswered_surface())
        .await
        .unwrap();
    let outcome = session
        .call(&ToolCall::new("read_file", json!({"path": "a.txt"})), &json!(null), CancellationToken::new())
        .await;

    assert!(matches!(outcome, CallOutcome::Completed { checkpoint: None, .. }));
    assert!(session.checkpoints().unwrap().list().await.unwrap().is_empty());
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
#[serial]
fn test_config_prefers_project_local_file() {
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join(".toolcore.yml"),
        "approval:\n  mode: auto-edit\nshell:\n  timeout-ms: 5000\n",
    )
    .unwrap();

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(project.path()).unwrap();
    let config = Config::load(None);
    std::env::set_current_dir(previous).unwrap();

    let config = config.unwrap();
    assert_eq!(config.approval.mode, ApprovalMode::AutoEdit);
    assert_eq!(config.shell.timeout_ms, 5000);
}
