//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;
use toolcore::McpServerConfig;

/// Stdio tool server in POSIX sh serving `<prefix>_echo` and `<prefix>_slow`
pub const MOCK_SERVER: &str = r#"#!/bin/sh
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

/// Config launching the mock server with `prefix`
pub fn mock_server(dir: &TempDir, prefix: &str) -> McpServerConfig {
    let path = dir.path().join("mock-mcp-server.sh");
    if !path.exists() {
        std::fs::write(&path, MOCK_SERVER).unwrap();
    }
    McpServerConfig::new("sh", vec![path.to_string_lossy().into_owned(), prefix.to_string()])
}

/// Executable call command echoing the tool name and its stdin
pub fn call_script(dir: &Path) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("call.sh");
    std::fs::write(&path, "#!/bin/sh\necho \"called $1 with $(cat)\"\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

/// Discovery command declaring a single `foo` tool
pub const FOO_DISCOVERY: &str =
    r#"echo '[{"function_declarations":[{"name":"foo","description":"Foo tool","parameters":{"type":"object"}}]}]'"#;
