//! Sub-agent dispatch: the `task` tool.
//!
//! The dispatcher spawns a nested engine run with a partitioned view
//! of state: the files map is shared with the parent, todos and
//! messages are fresh. Semantic tool events from the child surface in
//! the parent stream between `subagent-start` and `subagent-finish`;
//! the child's own lifecycle events stay private. Loop-control
//! callbacks are not inherited — the parent owns iteration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt as _;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::{AdvancedOptions, EngineParams, LoopControl, run_engine};
use crate::backend::BackendChoice;
use crate::error::ToolError;
use crate::event::{AgentEvent, EventQueue};
use crate::model::{GenerationOptions, ModelClient};
use crate::summarize::SummarizationOptions;
use crate::tool::{DynTool, SharedTool, ToolBox, ToolContext, ToolDefinition};
use crate::tools::builtin_tools;

/// Name of the built-in general-purpose sub-agent.
pub const GENERAL_PURPOSE_AGENT: &str = "general-purpose";

/// Step budget for a sub-agent run.
pub const DEFAULT_SUBAGENT_MAX_STEPS: usize = 50;

const GENERAL_PURPOSE_DESCRIPTION: &str =
    "A general-purpose agent for self-contained research and editing tasks.";

const DEFAULT_SUBAGENT_PROMPT: &str = "You are a focused sub-agent handling one \
delegated task. Use the available tools to complete it, then reply with a \
final report of what you did and found. Your reply is returned to the \
delegating agent verbatim.";

/// Declaration of a sub-agent the `task` tool can dispatch to.
#[derive(Clone)]
pub struct SubagentSpec {
    /// Unique sub-agent name.
    pub name: String,
    /// Description shown to the parent model.
    pub description: String,
    /// The sub-agent's own system prompt.
    pub system_prompt: Option<String>,
    /// Restricted tool set; defaults to the parent's user tools.
    pub tools: Option<Vec<SharedTool>>,
    /// Dedicated model; defaults to the parent's model.
    pub model: Option<Arc<dyn ModelClient>>,
    /// Schema for structured sub-agent output.
    pub output_schema: Option<Value>,
    /// Step budget.
    pub max_steps: usize,
    /// Sampling overrides; defaults to the parent's options.
    pub generation_options: Option<GenerationOptions>,
    /// Advanced option overrides, merged over the parent's.
    pub advanced_options: Option<AdvancedOptions>,
}

impl SubagentSpec {
    /// Declare a sub-agent.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: None,
            tools: None,
            model: None,
            output_schema: None,
            max_steps: DEFAULT_SUBAGENT_MAX_STEPS,
            generation_options: None,
            advanced_options: None,
        }
    }

    /// Set the sub-agent's system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Restrict the sub-agent to these user tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<SharedTool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Use a dedicated model.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Require structured output from the sub-agent.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Override the step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Override sampling options.
    #[must_use]
    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation_options = Some(options);
        self
    }

    /// Override advanced options (merged over the parent's).
    #[must_use]
    pub fn with_advanced_options(mut self, options: AdvancedOptions) -> Self {
        self.advanced_options = Some(options);
        self
    }
}

impl fmt::Debug for SubagentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubagentSpec")
            .field("name", &self.name)
            .field("max_steps", &self.max_steps)
            .field("has_model", &self.model.is_some())
            .field("restricted_tools", &self.tools.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TaskArgs {
    #[serde(default)]
    agent_name: Option<String>,
    task: String,
}

/// The `task` tool: dispatch work to a sub-agent.
pub struct TaskTool {
    subagents: Vec<SubagentSpec>,
    include_general_purpose: bool,
    model: Arc<dyn ModelClient>,
    user_tools: Vec<SharedTool>,
    backend: BackendChoice,
    generation_options: GenerationOptions,
    advanced_options: AdvancedOptions,
    eviction_limit: Option<usize>,
}

impl fmt::Debug for TaskTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.subagents.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("TaskTool")
            .field("subagents", &names)
            .field("include_general_purpose", &self.include_general_purpose)
            .finish_non_exhaustive()
    }
}

impl TaskTool {
    /// Create the dispatcher from the parent's configuration.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub(crate) fn new(
        subagents: Vec<SubagentSpec>,
        include_general_purpose: bool,
        model: Arc<dyn ModelClient>,
        user_tools: Vec<SharedTool>,
        backend: BackendChoice,
        generation_options: GenerationOptions,
        advanced_options: AdvancedOptions,
        eviction_limit: Option<usize>,
    ) -> Self {
        Self {
            subagents,
            include_general_purpose,
            model,
            user_tools,
            backend,
            generation_options,
            advanced_options,
            eviction_limit,
        }
    }

    fn find_spec(&self, name: &str) -> Option<SubagentSpec> {
        if name == GENERAL_PURPOSE_AGENT && self.include_general_purpose {
            return Some(SubagentSpec::new(
                GENERAL_PURPOSE_AGENT,
                GENERAL_PURPOSE_DESCRIPTION,
            ));
        }
        self.subagents.iter().find(|spec| spec.name == name).cloned()
    }
}

/// Child events that surface in the parent stream.
fn is_semantic(event: &AgentEvent) -> bool {
    matches!(
        event,
        AgentEvent::TodosChanged { .. }
            | AgentEvent::FileWriteStart { .. }
            | AgentEvent::FileWritten { .. }
            | AgentEvent::FileEdited { .. }
            | AgentEvent::FileRead { .. }
            | AgentEvent::Ls { .. }
            | AgentEvent::Glob { .. }
            | AgentEvent::Grep { .. }
            | AgentEvent::ExecuteStart { .. }
            | AgentEvent::ExecuteFinish { .. }
            | AgentEvent::WebSearchStart { .. }
            | AgentEvent::WebSearchFinish { .. }
            | AgentEvent::HttpRequestStart { .. }
            | AgentEvent::HttpRequestFinish { .. }
            | AgentEvent::FetchUrlStart { .. }
            | AgentEvent::FetchUrlFinish { .. }
            | AgentEvent::SubagentStart { .. }
            | AgentEvent::SubagentFinish { .. }
    )
}

#[async_trait]
impl DynTool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> String {
        let mut description = String::from(
            "Delegate a self-contained task to a sub-agent. The sub-agent \
             shares your files but plans independently and returns a final \
             report.\n\nAvailable agents:\n",
        );
        if self.include_general_purpose {
            description.push_str(&format!(
                "- {GENERAL_PURPOSE_AGENT}: {GENERAL_PURPOSE_DESCRIPTION}\n"
            ));
        }
        for spec in &self.subagents {
            description.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        }
        description
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            self.description(),
            json!({
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "Which sub-agent to dispatch to"
                    },
                    "task": {
                        "type": "string",
                        "description": "The full task description for the sub-agent"
                    }
                },
                "required": ["task"]
            }),
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: TaskArgs = serde_json::from_value(args)
            .map_err(|err| ToolError::InvalidArguments(err.to_string()))?;
        let agent_name = args
            .agent_name
            .unwrap_or_else(|| GENERAL_PURPOSE_AGENT.to_owned());

        let Some(spec) = self.find_spec(&agent_name) else {
            return Err(ToolError::InvalidArguments(format!(
                "unknown sub-agent '{agent_name}'"
            )));
        };

        debug!(agent = %agent_name, "dispatching sub-agent");

        // Partitioned state: shared files, fresh todos and messages.
        let child_state = ctx.state().child();
        let backend = self.backend.resolve(&child_state);

        let mut toolbox = ToolBox::new();
        for tool in builtin_tools(backend.as_sandbox().is_some()) {
            toolbox.add_shared(tool);
        }
        let user_tools = spec.tools.clone().unwrap_or_else(|| self.user_tools.clone());
        for tool in user_tools {
            toolbox.add_shared(tool);
        }

        let advanced_options = match &spec.advanced_options {
            Some(child) => AdvancedOptions::merged(&self.advanced_options, child),
            None => self.advanced_options.clone(),
        };

        let params = EngineParams {
            model: spec
                .model
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.model)),
            agent_name: agent_name.clone(),
            system_prompt: Some(
                spec.system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUBAGENT_PROMPT.to_owned()),
            ),
            enable_prompt_caching: false,
            toolbox,
            interrupt_on: std::collections::HashMap::new(),
            approval_handler: None,
            state: child_state,
            backend,
            events: EventQueue::new(),
            checkpointer: None,
            thread_id: None,
            resume: None,
            prompt: Some(args.task.clone()),
            messages: None,
            summarization: SummarizationOptions::default(),
            eviction_limit: self.eviction_limit,
            output_schema: spec.output_schema.clone(),
            loop_control: LoopControl::default(),
            generation_options: spec
                .generation_options
                .clone()
                .unwrap_or_else(|| self.generation_options.clone()),
            advanced_options,
            max_steps: spec.max_steps,
            cancel: ctx.cancel().clone(),
        };

        ctx.events().push(AgentEvent::SubagentStart {
            agent_name: agent_name.clone(),
            task: args.task,
        });

        let mut child = run_engine(params);
        let mut result: Option<(Option<String>, Option<Value>)> = None;
        let mut failure: Option<String> = None;

        while let Some(event) = child.next().await {
            if is_semantic(&event) {
                ctx.events().push(event);
                continue;
            }
            match event {
                AgentEvent::Done { text, output, .. } => result = Some((text, output)),
                AgentEvent::Error { error, .. } => failure = Some(error),
                _ => {}
            }
        }

        ctx.events().push(AgentEvent::SubagentFinish {
            agent_name: agent_name.clone(),
            is_error: failure.is_some(),
        });

        if let Some(error) = failure {
            return Err(ToolError::execution(format!(
                "sub-agent '{agent_name}' failed: {error}"
            )));
        }
        match result {
            Some((_, Some(output))) => Ok(output),
            Some((text, None)) => Ok(Value::String(text.unwrap_or_default())),
            None => Err(ToolError::execution(format!(
                "sub-agent '{agent_name}' produced no result"
            ))),
        }
    }
}
