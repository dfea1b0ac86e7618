//! web_fetch tool - fetch a URL and return its content as text

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::truncate;
use crate::approval::{ConfirmationKind, ConfirmationRequest};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, ToolSource, check_schema};

/// Responses larger than this are refused
const MAX_BODY: usize = 1_000_000;

/// Converted content beyond this many bytes is cut
const MAX_CONTENT: usize = 50_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch content from a URL, converting HTML to markdown
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        debug!("WebFetchTool::new: called");
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("toolcore/", env!("CARGO_PKG_VERSION"), " (web_fetch tool)"))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch URL: {}", e))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "WebFetchTool::fetch: HTTP error status");
            return Err(format!("HTTP error: {}", response.status()));
        }
        if response.content_length().is_some_and(|len| len as usize > MAX_BODY) {
            return Err("Response too large (> 1MB)".to_string());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        debug!(%content_type, "WebFetchTool::fetch: content type");

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("Failed to read response: {}", e))?;
            if bytes.len() + chunk.len() > MAX_BODY {
                debug!(read = bytes.len(), "WebFetchTool::fetch: body over limit, stopping");
                return Err("Response too large (> 1MB)".to_string());
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let content = if content_type.contains("text/html") || content_type.contains("application/xhtml") {
            html2md::rewrite_html(&body, false)
        } else if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
                Err(_) => body,
            }
        } else {
            body
        };
        Ok(content)
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn display_name(&self) -> &str {
        "Web Fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from an http(s) URL. HTML is converted to markdown. An optional prompt is returned alongside the content."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch"
                },
                "prompt": {
                    "type": "string",
                    "description": "What to extract from the page"
                }
            },
            "required": ["url"]
        })
    }

    fn source(&self) -> ToolSource {
        ToolSource::Builtin
    }

    fn validate(&self, args: &Value, _ctx: &ToolContext) -> Result<(), ToolError> {
        check_schema(self, args)?;
        let url = args["url"].as_str().unwrap_or_default();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::validation(
                self.name(),
                "/url",
                "must start with http:// or https://",
            ));
        }
        Ok(())
    }

    async fn should_confirm(&self, args: &Value, _ctx: &ToolContext) -> Option<ConfirmationRequest> {
        let url = args["url"].as_str().unwrap_or_default();
        let summary = match args["prompt"].as_str() {
            Some(prompt) => format!("{}\nPrompt: {}", url, prompt),
            None => url.to_string(),
        };
        Some(
            ConfirmationRequest::new(ConfirmationKind::Info, self.name(), format!("Fetch {}", url), summary)
                .with_scope(self.name()),
        )
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext, cancel: CancellationToken) -> ToolResult {
        debug!(?args, "WebFetchTool::execute: called");
        let url = args["url"].as_str().unwrap_or_default();

        let content = tokio::select! {
            fetched = self.fetch(url) => fetched,
            _ = cancel.cancelled() => return ToolResult::cancelled(),
        };
        let content = match content {
            Ok(c) => truncate(&c, MAX_CONTENT, "\n\n"),
            Err(msg) => {
                debug!(%msg, "WebFetchTool::execute: fetch failed");
                return ToolResult::error(msg);
            }
        };

        match args["prompt"].as_str() {
            Some(prompt) => ToolResult::structured(
                json!({"url": url, "prompt": prompt, "content": content}),
                content,
                false,
            ),
            None => ToolResult::success(content),
        }
    }
}
