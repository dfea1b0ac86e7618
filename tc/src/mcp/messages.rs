//! Wire types for the tool-server protocol
//!
//! JSON-RPC 2.0, one JSON message per line on the server's stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision sent in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Request from us to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Notification (no id, no response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// `notifications/cancelled` for an in-flight request
    pub fn cancelled(request_id: u64, reason: &str) -> Self {
        Self::new(
            "notifications/cancelled",
            Some(json!({"requestId": request_id, "reason": reason})),
        )
    }
}

/// Error object of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Our reply to a request the server sent us
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A line read from the server, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests
    Response {
        id: u64,
        result: Result<Value, JsonRpcError>,
    },
    /// Server-initiated request expecting an answer
    Request { id: Value, method: String },
    /// Server-initiated notification
    Notification { method: String },
}

impl Incoming {
    /// Classify a parsed message; `None` for anything unrecognisable
    pub fn classify(message: Value) -> Option<Self> {
        let Value::Object(mut map) = message else {
            return None;
        };

        let method = map.get("method").and_then(Value::as_str).map(str::to_string);
        let id = map.remove("id");

        match (method, id) {
            (Some(method), Some(id)) if !id.is_null() => Some(Self::Request { id, method }),
            (Some(method), _) => Some(Self::Notification { method }),
            (None, Some(id)) => {
                let id = id.as_u64()?;
                let result = match map.remove("error") {
                    Some(error) => Err(serde_json::from_value(error).unwrap_or(JsonRpcError {
                        code: -32603,
                        message: "malformed error object".to_string(),
                        data: None,
                    })),
                    None => Ok(map.remove("result").unwrap_or(Value::Null)),
                };
                Some(Self::Response { id, result })
            }
            (None, None) => None,
        }
    }
}

/// `initialize` parameters
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {"name": client_name, "version": client_version}
    })
}

/// A tool as declared by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// `tools/list` result page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDeclaration>,
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `tools/call` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Failure produced locally (transport error, timeout, cancellation)
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![json!({"type": "text", "text": message.into()})],
            is_error: true,
        }
    }

    /// Human-readable rendering of the content parts
    pub fn display_text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") => part.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
                Some("image") | Some("audio") => format!(
                    "[{}: {}]",
                    part["type"].as_str().unwrap_or_default(),
                    part.get("mimeType").and_then(Value::as_str).unwrap_or("unknown")
                ),
                Some("resource") => part
                    .pointer("/resource/text")
                    .or_else(|| part.pointer("/resource/uri"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Some("resource_link") => format!(
                    "[resource: {}]",
                    part.get("uri").and_then(Value::as_str).unwrap_or_default()
                ),
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialize() {
        let req = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
    }

    #[test]
    fn test_cancelled_notification() {
        let note = JsonRpcNotification::cancelled(7, "user cancelled");
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["method"], "notifications/cancelled");
        assert_eq!(json["params"]["requestId"], 7);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_classify_response() {
        let msg = json!({"jsonrpc":"2.0","id":3,"result":{"tools":[]}});
        assert_eq!(
            Incoming::classify(msg),
            Some(Incoming::Response {
                id: 3,
                result: Ok(json!({"tools": []}))
            })
        );
    }

    #[test]
    fn test_classify_error_response() {
        let msg = json!({"jsonrpc":"2.0","id":4,"error":{"code":-32000,"message":"nope"}});
        match Incoming::classify(msg) {
            Some(Incoming::Response { id: 4, result: Err(e) }) => assert_eq!(e.message, "nope"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classify_server_request_and_notification() {
        assert_eq!(
            Incoming::classify(json!({"jsonrpc":"2.0","id":"abc","method":"ping"})),
            Some(Incoming::Request {
                id: json!("abc"),
                method: "ping".to_string()
            })
        );
        assert_eq!(
            Incoming::classify(json!({"jsonrpc":"2.0","method":"notifications/progress"})),
            Some(Incoming::Notification {
                method: "notifications/progress".to_string()
            })
        );
        assert_eq!(Incoming::classify(json!([1, 2])), None);
    }

    #[test]
    fn test_tool_declaration_deserialize() {
        let json = r#"{"name":"search","description":"Find","inputSchema":{"type":"object"}}"#;
        let decl: McpToolDeclaration = serde_json::from_str(json).unwrap();
        assert_eq!(decl.name, "search");
        assert_eq!(decl.input_schema["type"], "object");
    }

    #[test]
    fn test_call_result_display_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a", "text": "body"}}
            ]
        }))
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.display_text(), "hello\n[image: image/png]\nbody");
    }
}
