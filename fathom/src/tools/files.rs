//! Filesystem tools over the invocation's backend.
//!
//! Thin wrappers: each validates arguments, delegates to the backend
//! capability, and emits its semantic event. Results are plain strings
//! shaped for the model.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::backend::DEFAULT_READ_LIMIT;
use crate::error::ToolError;
use crate::event::{AgentEvent, FileEntry, GrepHit};
use crate::tool::{Tool, ToolContext};

/// Arguments for [`LsTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LsArgs {
    /// Directory to list; defaults to the root.
    #[serde(default)]
    pub path: Option<String>,
}

/// List directory entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    const NAME: &'static str = "ls";
    type Args = LsArgs;
    type Output = String;

    fn description(&self) -> String {
        "List files and directories at a path.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let path = args.path.unwrap_or_else(|| "/".to_owned());
        let entries = ctx.backend().ls_info(&path).await?;

        ctx.events().push(AgentEvent::Ls {
            path: path.clone(),
            entries: entries
                .iter()
                .map(|info| FileEntry {
                    path: info.path.clone(),
                    is_dir: info.is_dir,
                })
                .collect(),
        });

        if entries.is_empty() {
            return Ok(format!("No entries under {path}"));
        }
        Ok(entries
            .iter()
            .map(|info| {
                if info.is_dir {
                    format!("{}/", info.path)
                } else {
                    info.path.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Arguments for [`ReadFileTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// Path of the file to read.
    pub file_path: String,
    /// Line offset to start from (0-based).
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Read a file as numbered lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    const NAME: &'static str = "read_file";
    type Args = ReadFileArgs;
    type Output = String;

    fn description(&self) -> String {
        "Read a file, returning numbered lines. Use offset and limit for large files.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(DEFAULT_READ_LIMIT);
        let text = ctx.backend().read(&args.file_path, offset, limit).await?;

        ctx.events().push(AgentEvent::FileRead {
            path: args.file_path.clone(),
        });

        if text.is_empty() {
            return Ok(format!("{} is empty", args.file_path));
        }
        Ok(text)
    }
}

/// Arguments for [`WriteFileTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Path of the file to create or overwrite.
    pub file_path: String,
    /// The full file content.
    pub content: String,
}

/// Create or overwrite a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    const NAME: &'static str = "write_file";
    type Args = WriteFileArgs;
    type Output = String;

    fn description(&self) -> String {
        "Write content to a file, creating it or replacing its content.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        ctx.events().push(AgentEvent::FileWriteStart {
            path: args.file_path.clone(),
        });

        ctx.backend().write(&args.file_path, &args.content).await?;

        let lines = if args.content.is_empty() {
            0
        } else {
            args.content.split('\n').count()
        };
        ctx.events().push(AgentEvent::FileWritten {
            path: args.file_path.clone(),
            lines,
        });

        Ok(format!("Wrote {lines} lines to {}", args.file_path))
    }
}

/// Arguments for [`EditFileTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditFileArgs {
    /// Path of the file to edit.
    pub file_path: String,
    /// Exact string to replace.
    pub old_string: String,
    /// Replacement string.
    pub new_string: String,
    /// Replace every occurrence instead of requiring a unique match.
    #[serde(default)]
    pub replace_all: Option<bool>,
}

/// Replace a string in a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    const NAME: &'static str = "edit_file";
    type Args = EditFileArgs;
    type Output = String;

    fn description(&self) -> String {
        "Replace an exact string in a file. The match must be unique unless replace_all is set."
            .to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let replacements = ctx
            .backend()
            .edit(
                &args.file_path,
                &args.old_string,
                &args.new_string,
                args.replace_all.unwrap_or(false),
            )
            .await?;

        ctx.events().push(AgentEvent::FileEdited {
            path: args.file_path.clone(),
            replacements,
        });

        Ok(format!(
            "Applied {replacements} replacement(s) in {}",
            args.file_path
        ))
    }
}

/// Arguments for [`GlobTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GlobArgs {
    /// Glob pattern, e.g. `/src/**/*.rs`.
    pub pattern: String,
}

/// Find files by glob pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    const NAME: &'static str = "glob";
    type Args = GlobArgs;
    type Output = String;

    fn description(&self) -> String {
        "Find files matching a glob pattern.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let entries = ctx.backend().glob_info(&args.pattern).await?;

        ctx.events().push(AgentEvent::Glob {
            pattern: args.pattern.clone(),
            matches: entries
                .iter()
                .map(|info| FileEntry {
                    path: info.path.clone(),
                    is_dir: info.is_dir,
                })
                .collect(),
        });

        if entries.is_empty() {
            return Ok(format!("No files match {}", args.pattern));
        }
        Ok(entries
            .iter()
            .map(|info| info.path.clone())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Arguments for [`GrepTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regular expression to search for.
    pub pattern: String,
    /// Restrict the search to paths under this prefix.
    #[serde(default)]
    pub path: Option<String>,
}

/// Search file contents with a regular expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    const NAME: &'static str = "grep";
    type Args = GrepArgs;
    type Output = String;

    fn description(&self) -> String {
        "Search file contents for a regular expression.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let matches = ctx
            .backend()
            .grep_raw(&args.pattern, args.path.as_deref())
            .await?;

        ctx.events().push(AgentEvent::Grep {
            pattern: args.pattern.clone(),
            matches: matches
                .iter()
                .map(|hit| GrepHit {
                    path: hit.path.clone(),
                    line_number: hit.line_number,
                    line: hit.line.clone(),
                })
                .collect(),
        });

        if matches.is_empty() {
            return Ok(format!("No matches for {}", args.pattern));
        }
        Ok(matches
            .iter()
            .map(|hit| format!("{}:{}: {}", hit.path, hit.line_number, hit.line))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StateBackend;
    use crate::cancel::CancelToken;
    use crate::event::EventQueue;
    use crate::state::AgentState;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx_with_files(files: &[(&str, &str)]) -> ToolContext {
        let state = AgentState::new();
        for (path, content) in files {
            state.put_file(*path, content);
        }
        ToolContext::new(
            state.clone(),
            Arc::new(StateBackend::new(state)),
            EventQueue::new(),
            CancelToken::new(),
        )
    }

    #[tokio::test]
    async fn ls_lists_and_emits() {
        let ctx = ctx_with_files(&[("/a.txt", "x"), ("/docs/b.txt", "y")]);
        let result = Tool::call_json(&LsTool, json!({}), &ctx).await.unwrap();
        let text = result.as_str().unwrap();
        assert!(text.contains("/a.txt"));
        assert!(text.contains("/docs/"));

        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::Ls { entries, .. } if entries.len() == 2));
    }

    #[tokio::test]
    async fn read_file_numbers_and_emits() {
        let ctx = ctx_with_files(&[("/f.txt", "alpha\nbeta")]);
        let result = Tool::call_json(&ReadFileTool, json!({"file_path": "/f.txt"}), &ctx)
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("     1\talpha"));

        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::FileRead { path } if path == "/f.txt"));
    }

    #[tokio::test]
    async fn read_missing_file_errors() {
        let ctx = ctx_with_files(&[]);
        let err = Tool::call_json(&ReadFileTool, json!({"file_path": "/nope"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn write_file_brackets_with_events() {
        let ctx = ctx_with_files(&[]);
        Tool::call_json(
            &WriteFileTool,
            json!({"file_path": "/out.txt", "content": "one\ntwo"}),
            &ctx,
        )
        .await
        .unwrap();

        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::FileWriteStart { path } if path == "/out.txt"));
        assert!(
            matches!(&events[1], AgentEvent::FileWritten { path, lines } if path == "/out.txt" && *lines == 2)
        );
        assert_eq!(ctx.state().file("/out.txt").unwrap().text(), "one\ntwo");
    }

    #[tokio::test]
    async fn edit_file_reports_replacements() {
        let ctx = ctx_with_files(&[("/f.txt", "x y x")]);
        let result = Tool::call_json(
            &EditFileTool,
            json!({
                "file_path": "/f.txt",
                "old_string": "x",
                "new_string": "z",
                "replace_all": true
            }),
            &ctx,
        )
        .await
        .unwrap();
        assert!(result.as_str().unwrap().contains("2 replacement"));

        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::FileEdited { replacements, .. } if *replacements == 2));
    }

    #[tokio::test]
    async fn glob_and_grep_emit_matches() {
        let ctx = ctx_with_files(&[("/src/a.rs", "fn a() {}"), ("/src/b.md", "docs")]);

        Tool::call_json(&GlobTool, json!({"pattern": "/src/*.rs"}), &ctx)
            .await
            .unwrap();
        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::Glob { matches, .. } if matches.len() == 1));

        Tool::call_json(&GrepTool, json!({"pattern": "fn "}), &ctx)
            .await
            .unwrap();
        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::Grep { matches, .. } if matches.len() == 1));
    }
}
