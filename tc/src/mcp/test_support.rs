//! Scripted tool server for tests

use tempfile::TempDir;

use crate::config::McpServerConfig;

/// Minimal stdio tool server in POSIX sh
///
/// Serves two tools, `<prefix>_echo` and `<prefix>_slow` (which never
/// answers), split across two `tools/list` pages.
const MOCK_SERVER: &str = r#"#!/bin/sh
prefix="$1"
echo "INFO mock server starting" >&2
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"%s","version":"1.0"}}}\n' "$id" "$prefix"
      ;;
    *'"method":"tools/list"'*'"cursor":"page2"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"%s_slow","description":"Never answers","inputSchema":{"type":"object"}}]}}\n' "$id" "$prefix"
      ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"%s_echo","description":"Echo","inputSchema":{"$schema":"http://json-schema.org/draft-07/schema#","type":"object","additionalProperties":false,"properties":{"msg":{"type":"string"}}}}],"nextCursor":"page2"}}\n' "$id" "$prefix"
      ;;
    *'"method":"tools/call"'*'_slow"'*)
      ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"echo from %s"}]}}\n' "$id" "$prefix"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id"
      ;;
  esac
done
"#;

/// Write the mock server into `dir` and return a config launching it
pub fn mock_server(dir: &TempDir, prefix: &str) -> McpServerConfig {
    let path = dir.path().join("mock-mcp-server.sh");
    if !path.exists() {
        std::fs::write(&path, MOCK_SERVER).unwrap();
    }
    McpServerConfig::new("sh", vec![path.to_string_lossy().into_owned(), prefix.to_string()])
}
