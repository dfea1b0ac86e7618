//! Built-in tools available in every session

mod diff;
mod edit;
mod read_file;
mod shell;
mod web_fetch;
mod write_file;

use std::sync::Arc;
use tracing::debug;

pub use diff::unified_diff;
pub use edit::{EditTool, PREPARED_EDIT_TTL};
pub use read_file::ReadFileTool;
pub use shell::{ShellTool, root_command};
pub use web_fetch::WebFetchTool;
pub use write_file::WriteFileTool;

use super::{Tool, ToolRegistry};

/// Every built-in tool
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadFileTool),
        Arc::new(WriteFileTool),
        Arc::new(EditTool::new()),
        Arc::new(ShellTool),
        Arc::new(WebFetchTool::new()),
    ]
}

/// Register the built-ins, skipping names listed in `exclude`
///
/// Returns how many were registered.
pub fn register_builtins(registry: &mut ToolRegistry, exclude: &[String]) -> usize {
    let mut count = 0;
    for tool in builtin_tools() {
        if exclude.iter().any(|name| name == tool.name()) {
            debug!(tool = %tool.name(), "register_builtins: excluded");
            continue;
        }
        registry.register(tool);
        count += 1;
    }
    count
}

/// Cut `text` to at most `max` bytes on a char boundary, noting the total
fn truncate(text: &str, max: usize, separator: &str) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...{}[truncated, {} chars total]", &text[..cut], separator, text.len())
}
