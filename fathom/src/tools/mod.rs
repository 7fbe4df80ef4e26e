//! Built-in tools registered per invocation.
//!
//! The registry builder assembles the tool set for one run: the todo
//! and filesystem tools are always present, `execute` joins when the
//! backend is a sandbox, and the `task` dispatcher joins when
//! sub-agents are available. User tools are merged on top by the
//! engine.

mod execute;
mod fetch;
mod files;
mod task;
mod todos;

pub use execute::ExecuteTool;
pub use fetch::FetchUrlTool;
pub use files::{EditFileTool, GlobTool, GrepTool, LsTool, ReadFileTool, WriteFileTool};
pub use task::{GENERAL_PURPOSE_AGENT, SubagentSpec, TaskTool};
pub use todos::{ReadTodosTool, WriteTodosTool};

use std::sync::Arc;

use crate::tool::SharedTool;

/// The always-present built-in tools: todos and filesystem operations.
#[must_use]
pub fn base_tools() -> Vec<SharedTool> {
    vec![
        Arc::new(WriteTodosTool) as SharedTool,
        Arc::new(ReadTodosTool),
        Arc::new(LsTool),
        Arc::new(ReadFileTool),
        Arc::new(WriteFileTool),
        Arc::new(EditFileTool),
        Arc::new(GlobTool),
        Arc::new(GrepTool),
    ]
}

/// Built-in tools for a run: [`base_tools`], plus `execute` when the
/// backend advertises a sandbox.
#[must_use]
pub fn builtin_tools(sandbox: bool) -> Vec<SharedTool> {
    let mut tools = base_tools();
    if sandbox {
        tools.push(Arc::new(ExecuteTool) as SharedTool);
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_tools_cover_todos_and_files() {
        let names: Vec<String> = base_tools().iter().map(|t| t.name().to_owned()).collect();
        for expected in [
            "write_todos",
            "read_todos",
            "ls",
            "read_file",
            "write_file",
            "edit_file",
            "glob",
            "grep",
        ] {
            assert!(names.contains(&expected.to_owned()), "missing {expected}");
        }
    }

    #[test]
    fn execute_requires_sandbox() {
        let with = builtin_tools(true);
        let without = builtin_tools(false);
        assert!(with.iter().any(|t| t.name() == "execute"));
        assert!(!without.iter().any(|t| t.name() == "execute"));
    }
}
