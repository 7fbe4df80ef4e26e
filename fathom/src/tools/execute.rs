//! Sandbox command execution tool.
//!
//! Registered only when the backend advertises [`SandboxBackend`];
//! the sandbox enforces the timeout and output cap.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::event::AgentEvent;
use crate::tool::{Tool, ToolContext};

/// Arguments for [`ExecuteTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteArgs {
    /// The shell command line to run.
    pub command: String,
}

/// Run a shell command in the invocation's sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteTool;

#[async_trait]
impl Tool for ExecuteTool {
    const NAME: &'static str = "execute";
    type Args = ExecuteArgs;
    type Output = String;

    fn description(&self) -> String {
        "Run a shell command in the sandbox. Output is captured and truncated at 1 MiB."
            .to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let Some(sandbox) = ctx.backend().as_sandbox() else {
            return Err(ToolError::Unsupported(
                "the current backend cannot execute commands".to_owned(),
            ));
        };

        ctx.events().push(AgentEvent::ExecuteStart {
            command: args.command.clone(),
        });

        let result = sandbox.execute(&args.command, ctx.cancel()).await?;

        ctx.events().push(AgentEvent::ExecuteFinish {
            exit_code: result.exit_code,
            truncated: result.truncated,
        });

        let mut output = String::new();
        if result.exit_code != 0 {
            output.push_str(&format!("exit code {}\n", result.exit_code));
        }
        if !result.stdout.is_empty() {
            output.push_str(&result.stdout);
        }
        if !result.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&result.stderr);
        }
        if output.is_empty() {
            output.push_str("(no output)");
        }
        if result.truncated {
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("[output truncated]");
        }
        Ok(output)
    }
}
