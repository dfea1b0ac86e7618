//! Protocol client error types

use std::time::Duration;
use thiserror::Error;

use super::messages::JsonRpcError;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server '{0}' is not connected")]
    NotConnected(String),

    #[error("Server '{0}' is not configured")]
    UnknownServer(String),

    #[error("Server '{server}' timed out after {timeout:?} waiting for {method}")]
    Timeout {
        server: String,
        method: String,
        timeout: Duration,
    },

    #[error("Server '{server}' returned error {} for {method}: {}", .error.code, .error.message)]
    Rpc {
        server: String,
        method: String,
        error: JsonRpcError,
    },

    #[error("Connection to server '{0}' closed")]
    Closed(String),

    #[error("Request to server '{0}' was cancelled")]
    Cancelled(String),

    #[error("IO error talking to server: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message from server: {0}")]
    Protocol(#[from] serde_json::Error),
}
