//! McpConnection - one live stdio connection to a tool server

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::McpError;
use super::messages::{
    CallToolResult, Incoming, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    METHOD_NOT_FOUND, McpToolDeclaration, initialize_params,
};
use crate::config::McpServerConfig;
use crate::tools::process::{prepare_command, terminate_child};

/// Upper bound on `tools/list` pages, against servers that loop their cursor
const MAX_LIST_PAGES: usize = 100;

/// How long a server gets to exit after its stdin closes
const CLOSE_GRACE: Duration = Duration::from_millis(500);

type Writer = Arc<Mutex<Option<ChildStdin>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, JsonRpcError>>>>>;

/// What to do with a line the server wrote to stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrLevel {
    /// Informational noise
    Drop,
    Debug,
    Warn,
}

/// Heuristic filter for the server's diagnostic side channel
pub fn classify_stderr(line: &str) -> StderrLevel {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("INFO") || trimmed.contains("] INFO") || trimmed.contains("INFO:") {
        return StderrLevel::Drop;
    }

    let lower = trimmed.to_lowercase();
    if ["error", "panic", "traceback"].iter().any(|w| lower.contains(w)) {
        StderrLevel::Warn
    } else {
        StderrLevel::Debug
    }
}

/// A spawned, initialised tool server speaking newline-delimited JSON-RPC
pub struct McpConnection {
    server: String,
    writer: Writer,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
    reader_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    call_timeout: Duration,
}

impl McpConnection {
    /// Spawn the server process and start routing its output
    ///
    /// The returned connection has not been initialised; see [`Self::initialize`].
    pub fn spawn(server: &str, config: &McpServerConfig, default_cwd: &Path) -> Result<Self, McpError> {
        debug!(%server, command = %config.command, "McpConnection::spawn: called");
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .current_dir(config.cwd.as_deref().unwrap_or(default_cwd));
        prepare_command(&mut cmd, true);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            server: server.to_string(),
            source,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) = (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(McpError::Closed(server.to_string()));
        };

        let writer: Writer = Arc::new(Mutex::new(Some(stdin)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            server.to_string(),
            stdout,
            writer.clone(),
            pending.clone(),
            closed.clone(),
        ));
        let stderr_task = tokio::spawn(stderr_loop(server.to_string(), stderr));

        Ok(Self {
            server: server.to_string(),
            writer,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            child: Mutex::new(Some(child)),
            reader_task,
            stderr_task,
            call_timeout: config.call_timeout(),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Handshake: `initialize` then `notifications/initialized`
    pub async fn initialize(&self, timeout: Duration) -> Result<Value, McpError> {
        debug!(server = %self.server, "McpConnection::initialize: called");
        let params = initialize_params("toolcore", env!("CARGO_PKG_VERSION"));
        let result = self
            .request("initialize", Some(params), timeout, &CancellationToken::new())
            .await?;
        self.notify("notifications/initialized", None).await?;
        debug!(server = %self.server, "McpConnection::initialize: handshake complete");
        Ok(result)
    }

    /// All tools the server declares, following `nextCursor`
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<McpToolDeclaration>, McpError> {
        debug!(server = %self.server, "McpConnection::list_tools: called");
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let value = self
                .request("tools/list", params, timeout, &CancellationToken::new())
                .await?;
            let page: ListToolsResult = serde_json::from_value(value)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(server = %self.server, count = tools.len(), "McpConnection::list_tools: done");
        Ok(tools)
    }

    /// Invoke a tool; cancellation is forwarded to the server
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        debug!(server = %self.server, %name, "McpConnection::call_tool: called");
        let params = json!({"name": name, "arguments": arguments});
        let value = self.request("tools/call", Some(params), self.call_timeout, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a request and wait for its response, a timeout, or cancellation
    ///
    /// A timed-out or cancelled request is dropped from the pending map, so a
    /// late response is discarded by the reader.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(server = %self.server, %method, id, "McpConnection::request: called");

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(McpError::Closed(self.server.clone()));
            }
            pending.insert(id, tx);
        }

        if let Err(e) = write_line(&self.server, &self.writer, &JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        tokio::select! {
            reply = rx => match reply {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(McpError::Rpc {
                    server: self.server.clone(),
                    method: method.to_string(),
                    error,
                }),
                Err(_) => Err(McpError::Closed(self.server.clone())),
            },
            _ = tokio::time::sleep(timeout) => {
                self.abandon(id, "timeout").await;
                Err(McpError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    timeout,
                })
            }
            _ = cancel.cancelled() => {
                self.abandon(id, "cancelled by user").await;
                Err(McpError::Cancelled(self.server.clone()))
            }
        }
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        debug!(server = %self.server, %method, "McpConnection::notify: called");
        write_line(&self.server, &self.writer, &JsonRpcNotification::new(method, params)).await
    }

    async fn abandon(&self, id: u64, reason: &str) {
        debug!(server = %self.server, id, %reason, "McpConnection::abandon: called");
        self.pending.lock().await.remove(&id);
        if let Err(e) = write_line(&self.server, &self.writer, &JsonRpcNotification::cancelled(id, reason)).await {
            debug!(%e, "McpConnection::abandon: could not notify server");
        }
    }

    /// Whether the server has closed its output
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a response
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Close stdin, give the server a moment to exit, then terminate it
    pub async fn close(&self) {
        debug!(server = %self.server, "McpConnection::close: called");
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(_) => debug!(server = %self.server, "McpConnection::close: server exited"),
                Err(_) => {
                    if let Err(e) = terminate_child(&mut child).await {
                        warn!(server = %self.server, %e, "Failed to terminate tool server");
                    }
                }
            }
        }

        self.reader_task.abort();
        self.stderr_task.abort();
        self.pending.lock().await.clear();
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        // Child is kill_on_drop; the tasks hold pipe ends and must go too
        self.reader_task.abort();
        self.stderr_task.abort();
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection").field("server", &self.server).finish()
    }
}

async fn write_line<T: Serialize>(server: &str, writer: &Writer, message: &T) -> Result<(), McpError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let Some(stdin) = guard.as_mut() else {
        return Err(McpError::Closed(server.to_string()));
    };
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_loop(server: String, stdout: ChildStdout, writer: Writer, pending: PendingMap, closed: Arc<AtomicBool>) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(%server, "read_loop: server closed stdout");
                break;
            }
            Err(e) => {
                warn!(%server, %e, "Failed reading from tool server");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<Value>(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!(%server, %e, "read_loop: ignoring non-JSON line");
                continue;
            }
        };

        match Incoming::classify(message) {
            Some(Incoming::Response { id, result }) => match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(result);
                }
                None => debug!(%server, id, "read_loop: discarding response nobody is waiting for"),
            },
            Some(Incoming::Request { id, method }) => {
                let reply = if method == "ping" {
                    JsonRpcResponse::result(id, json!({}))
                } else {
                    debug!(%server, %method, "read_loop: unsupported server request");
                    JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
                };
                if let Err(e) = write_line(&server, &writer, &reply).await {
                    debug!(%server, %e, "read_loop: failed to answer server request");
                }
            }
            Some(Incoming::Notification { method }) => {
                debug!(%server, %method, "read_loop: notification");
            }
            None => debug!(%server, "read_loop: unrecognised message"),
        }
    }

    // Wake everyone still waiting: their senders drop and they see Closed
    let mut pending = pending.lock().await;
    closed.store(true, Ordering::SeqCst);
    pending.clear();
}

async fn stderr_loop(server: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match classify_stderr(&line) {
            StderrLevel::Drop => {}
            StderrLevel::Debug => debug!(%server, "stderr: {}", line),
            StderrLevel::Warn => warn!(%server, "stderr: {}", line),
        }
    }
}
