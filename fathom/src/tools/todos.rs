//! Todo-list planning tools.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::event::AgentEvent;
use crate::state::{TodoItem, TodoStatus};
use crate::tool::{Tool, ToolContext};

/// One todo entry as accepted from the model.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TodoInput {
    /// Stable id; assigned from the position when omitted.
    #[serde(default)]
    pub id: Option<String>,
    /// Description of the work item.
    pub content: String,
    /// Status; defaults to pending.
    #[serde(default)]
    pub status: Option<TodoStatus>,
}

/// Arguments for [`WriteTodosTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteTodosArgs {
    /// The complete new todo list, replacing the current one.
    pub todos: Vec<TodoInput>,
}

/// Replace the agent's todo list.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteTodosTool;

#[async_trait]
impl Tool for WriteTodosTool {
    const NAME: &'static str = "write_todos";
    type Args = WriteTodosArgs;
    type Output = String;

    fn description(&self) -> String {
        "Replace the todo list used to plan and track the current task. \
         Pass the full list; items not included are dropped."
            .to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let todos: Vec<TodoItem> = args
            .todos
            .into_iter()
            .enumerate()
            .map(|(index, input)| TodoItem {
                id: input.id.unwrap_or_else(|| (index + 1).to_string()),
                content: input.content,
                status: input.status.unwrap_or(TodoStatus::Pending),
            })
            .collect();

        let count = todos.len();
        ctx.state().set_todos(todos.clone());
        ctx.events().push(AgentEvent::TodosChanged { todos });

        Ok(format!("Updated todo list to {count} items"))
    }
}

/// Arguments for [`ReadTodosTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadTodosArgs {}

/// Read back the current todo list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadTodosTool;

#[async_trait]
impl Tool for ReadTodosTool {
    const NAME: &'static str = "read_todos";
    type Args = ReadTodosArgs;
    type Output = String;

    fn description(&self) -> String {
        "List the current todos with their statuses.".to_owned()
    }

    async fn call(&self, _args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        let todos = ctx.state().todos();
        if todos.is_empty() {
            return Ok("No todos yet".to_owned());
        }
        Ok(todos
            .iter()
            .map(|todo| {
                format!(
                    "{}. [{}] {}",
                    todo.id,
                    match todo.status {
                        TodoStatus::Pending => "pending",
                        TodoStatus::InProgress => "in_progress",
                        TodoStatus::Completed => "completed",
                        TodoStatus::Cancelled => "cancelled",
                    },
                    todo.content
                )
            })
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

    fn ctx() -> ToolContext {
        let state = AgentState::new();
        ToolContext::new(
            state.clone(),
            Arc::new(StateBackend::new(state)),
            EventQueue::new(),
            CancelToken::new(),
        )
    }

    #[tokio::test]
    async fn write_todos_replaces_list_and_emits_event() {
        let ctx = ctx();
        let result = Tool::call_json(
            &WriteTodosTool,
            json!({"todos": [{"content": "write docs"}]}),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(result, json!("Updated todo list to 1 items"));

        let todos = ctx.state().todos();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].content, "write docs");
        assert_eq!(todos[0].status, TodoStatus::Pending);
        assert_eq!(todos[0].id, "1");

        let events = ctx.events().drain();
        assert!(matches!(&events[0], AgentEvent::TodosChanged { todos } if todos.len() == 1));
    }

    #[tokio::test]
    async fn write_todos_honors_explicit_ids_and_status() {
        let ctx = ctx();
        Tool::call_json(
            &WriteTodosTool,
            json!({"todos": [{"id": "t-9", "content": "x", "status": "completed"}]}),
            &ctx,
        )
        .await
        .unwrap();

        let todos = ctx.state().todos();
        assert_eq!(todos[0].id, "t-9");
        assert_eq!(todos[0].status, TodoStatus::Completed);
    }

    #[tokio::test]
    async fn read_todos_renders_statuses() {
        let ctx = ctx();
        ctx.state().set_todos(vec![TodoItem {
            id: "1".to_owned(),
            content: "review".to_owned(),
            status: TodoStatus::InProgress,
        }]);

        let result = Tool::call_json(&ReadTodosTool, json!({}), &ctx).await.unwrap();
        let text = result.as_str().unwrap();
        assert!(text.contains("in_progress"));
        assert!(text.contains("review"));
    }

    #[tokio::test]
    async fn read_todos_when_empty() {
        let ctx = ctx();
        let result = Tool::call_json(&ReadTodosTool, json!({}), &ctx).await.unwrap();
        assert_eq!(result, json!("No todos yet"));
    }
}
