//! Tool trait and utilities for defining agent tools.
//!
//! Tools are the primary way agents act on the world. Each tool
//! receives a [`ToolContext`] carrying the invocation's shared state,
//! the storage backend, the event queue, and the abort token; semantic
//! events a tool enqueues are delivered before its `tool-result` in
//! the run's event stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Backend;
use crate::cancel::CancelToken;
use crate::error::ToolError;
use crate::event::EventQueue;
use crate::state::AgentState;

/// Definition of a tool for LLM function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool, snake_case.
    pub name: String,
    /// Description helping the model decide when to use the tool.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Returns the tool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Per-execution context handed to a tool.
#[derive(Clone)]
pub struct ToolContext {
    state: AgentState,
    backend: Arc<dyn Backend>,
    events: EventQueue,
    cancel: CancelToken,
    tool_call_id: String,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_call_id", &self.tool_call_id)
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    /// Create a context for an invocation.
    #[must_use]
    pub fn new(
        state: AgentState,
        backend: Arc<dyn Backend>,
        events: EventQueue,
        cancel: CancelToken,
    ) -> Self {
        Self {
            state,
            backend,
            events,
            cancel,
            tool_call_id: String::new(),
        }
    }

    /// Derive a context bound to one tool call id.
    #[must_use]
    pub fn with_tool_call_id(&self, id: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.tool_call_id = id.into();
        ctx
    }

    /// The invocation's shared state.
    #[must_use]
    pub const fn state(&self) -> &AgentState {
        &self.state
    }

    /// The storage backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// A shareable handle to the backend.
    #[must_use]
    pub fn backend_arc(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// The event queue for semantic events.
    #[must_use]
    pub const fn events(&self) -> &EventQueue {
        &self.events
    }

    /// The run's abort token.
    #[must_use]
    pub const fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Id of the tool call being executed.
    #[must_use]
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }
}

/// The core trait for typed tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: for<'de> Deserialize<'de> + JsonSchema + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Get the name of the tool.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// JSON schema for the tool's parameters, derived from
    /// [`Tool::Args`] unless overridden.
    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(Self::Args))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }

    /// Execute the tool with typed arguments.
    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError>;

    /// Get the tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }

    /// Call the tool with JSON arguments and return JSON output.
    async fn call_json(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>
    where
        Self::Output: 'static,
    {
        // Providers sometimes deliver arguments as a JSON string.
        let typed: Self::Args = match &args {
            Value::String(raw) => serde_json::from_str(raw)
                .map_err(|err| ToolError::InvalidArguments(err.to_string()))?,
            _ => serde_json::from_value(args)
                .map_err(|err| ToolError::InvalidArguments(err.to_string()))?,
        };
        let output = self.call(typed, ctx).await?;
        serde_json::to_value(output).map_err(|err| ToolError::Execution(err.to_string()))
    }
}

/// A shareable dynamic tool.
pub type SharedTool = Arc<dyn DynTool>;

/// Object-safe version of [`Tool`] for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute with JSON arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> String {
        Tool::description(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        Tool::call_json(self, args, ctx).await
    }
}

/// Render a tool result value as tool-message content.
pub(crate) fn result_content(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// A collection of tools available to one invocation.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: HashMap<String, SharedTool>,
}

impl ToolBox {
    /// Create a new empty toolbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed tool.
    pub fn add<T: Tool + 'static>(&mut self, tool: T)
    where
        T::Output: 'static,
    {
        self.tools.insert(tool.name().to_owned(), Arc::new(tool));
    }

    /// Add a shared dynamic tool.
    pub fn add_shared(&mut self, tool: SharedTool) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedTool> {
        self.tools.get(name)
    }

    /// Check if the toolbox contains a tool with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the toolbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Sorted tool names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All tool definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Restrict to the named tools, dropping the rest.
    #[must_use]
    pub fn filtered(&self, active: &[String]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| active.contains(name))
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
        }
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_owned()))?;
        tool.execute(args, ctx).await
    }
}

impl fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolBox")
            .field("tools", &self.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StateBackend;
    use serde_json::json;

    fn ctx() -> ToolContext {
        let state = AgentState::new();
        ToolContext::new(
            state.clone(),
            Arc::new(StateBackend::new(state)),
            EventQueue::new(),
            CancelToken::new(),
        )
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct EchoTool;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoArgs {
        /// The message to echo.
        message: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        const NAME: &'static str = "echo";
        type Args = EchoArgs;
        type Output = String;

        fn description(&self) -> String {
            "Echoes back the input message.".to_owned()
        }

        async fn call(
            &self,
            args: Self::Args,
            _ctx: &ToolContext,
        ) -> Result<Self::Output, ToolError> {
            Ok(args.message)
        }
    }

    mod definitions {
        use super::*;

        #[test]
        fn derives_schema_from_args() {
            let def = Tool::definition(&EchoTool);
            assert_eq!(def.name, "echo");
            let properties = def.parameters.get("properties").unwrap();
            assert!(properties.get("message").is_some());
        }
    }

    mod execution {
        use super::*;

        #[tokio::test]
        async fn call_json_accepts_object_args() {
            let ctx = ctx();
            let result = Tool::call_json(&EchoTool, json!({"message": "hi"}), &ctx)
                .await
                .unwrap();
            assert_eq!(result, json!("hi"));
        }

        #[tokio::test]
        async fn call_json_accepts_string_args() {
            let ctx = ctx();
            let result =
                Tool::call_json(&EchoTool, json!(r#"{"message": "hi"}"#), &ctx)
                    .await
                    .unwrap();
            assert_eq!(result, json!("hi"));
        }

        #[tokio::test]
        async fn call_json_rejects_bad_args() {
            let ctx = ctx();
            let err = Tool::call_json(&EchoTool, json!({"wrong": 1}), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }

    mod toolbox {
        use super::*;

        #[test]
        fn add_and_lookup() {
            let mut toolbox = ToolBox::new();
            toolbox.add(EchoTool);
            assert!(toolbox.contains("echo"));
            assert_eq!(toolbox.len(), 1);
            assert_eq!(toolbox.names(), vec!["echo"]);
        }

        #[tokio::test]
        async fn execute_routes_by_name() {
            let mut toolbox = ToolBox::new();
            toolbox.add(EchoTool);
            let result = toolbox
                .execute("echo", json!({"message": "routed"}), &ctx())
                .await
                .unwrap();
            assert_eq!(result, json!("routed"));
        }

        #[tokio::test]
        async fn execute_missing_tool_is_not_found() {
            let toolbox = ToolBox::new();
            let err = toolbox
                .execute("absent", json!({}), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::NotFound(_)));
        }

        #[test]
        fn filtered_keeps_only_active() {
            let mut toolbox = ToolBox::new();
            toolbox.add(EchoTool);
            let filtered = toolbox.filtered(&["other".to_owned()]);
            assert!(filtered.is_empty());
            let filtered = toolbox.filtered(&["echo".to_owned()]);
            assert!(filtered.contains("echo"));
        }
    }

    mod content {
        use super::*;

        #[test]
        fn string_results_stay_plain() {
            assert_eq!(result_content(&json!("plain")), "plain");
        }

        #[test]
        fn structured_results_serialize() {
            assert_eq!(result_content(&json!({"a": 1})), r#"{"a":1}"#);
        }
    }
}
