//! Agent builder with a fluent API.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::approval::{ApprovalHandler, InterruptPolicy};
use crate::backend::{Backend, BackendChoice};
use crate::checkpoint::CheckpointStore;
use crate::error::{Error, Result};
use crate::model::{GenerationOptions, ModelClient, ModelMiddleware, apply_middleware};
use crate::skills::{SkillInfo, load_skills_index, skills_dir_for_agent};
use crate::state::AgentState;
use crate::summarize::SummarizationOptions;
use crate::tool::{DynTool, SharedTool, Tool};
use crate::tools::{GENERAL_PURPOSE_AGENT, SubagentSpec};

use super::config::{AdvancedOptions, AgentConfig, DEFAULT_MAX_STEPS, LoopControl, OutputSpec};
use super::DeepAgent;

/// Builder for [`DeepAgent`].
///
/// # Example
///
/// ```rust,ignore
/// let agent = DeepAgent::builder()
///     .model(model)
///     .max_steps(10)
///     .interrupt_on("execute", InterruptPolicy::Always)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ModelClient>>,
    middleware: Vec<Arc<dyn ModelMiddleware>>,
    name: Option<String>,
    system_prompt: Option<String>,
    user_tools: Vec<SharedTool>,
    subagents: Vec<SubagentSpec>,
    include_general_purpose_agent: bool,
    max_steps: usize,
    backend: BackendChoice,
    eviction_limit: Option<usize>,
    enable_prompt_caching: bool,
    summarization: SummarizationOptions,
    interrupt_on: HashMap<String, InterruptPolicy>,
    checkpointer: Option<Arc<dyn CheckpointStore>>,
    skills_dir: Option<PathBuf>,
    agent_id: Option<String>,
    output: Option<OutputSpec>,
    loop_control: LoopControl,
    generation_options: GenerationOptions,
    advanced_options: AdvancedOptions,
    approval_handler: Option<Arc<dyn ApprovalHandler>>,
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("has_model", &self.model.is_some())
            .field("tools", &self.user_tools.len())
            .field("subagents", &self.subagents.len())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl AgentBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            include_general_purpose_agent: true,
            max_steps: DEFAULT_MAX_STEPS,
            ..Self::default()
        }
    }

    /// Set the language model (required).
    #[must_use]
    pub fn model(mut self, model: impl ModelClient + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set the language model from a shared handle.
    #[must_use]
    pub fn model_arc(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Add a model middleware layer; the first added is outermost.
    #[must_use]
    pub fn middleware(mut self, layer: impl ModelMiddleware + 'static) -> Self {
        self.middleware.push(Arc::new(layer));
        self
    }

    /// Set the agent's name, used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a user tool.
    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self
    where
        T::Output: 'static,
    {
        self.user_tools.push(Arc::new(tool));
        self
    }

    /// Add a shared dynamic tool.
    #[must_use]
    pub fn tool_shared(mut self, tool: Arc<dyn DynTool>) -> Self {
        self.user_tools.push(tool);
        self
    }

    /// Declare a sub-agent.
    #[must_use]
    pub fn subagent(mut self, spec: SubagentSpec) -> Self {
        self.subagents.push(spec);
        self
    }

    /// Whether the general-purpose sub-agent is available (default
    /// true).
    #[must_use]
    pub const fn include_general_purpose_agent(mut self, include: bool) -> Self {
        self.include_general_purpose_agent = include;
        self
    }

    /// Set the maximum number of steps (default 100).
    #[must_use]
    pub const fn max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    /// Use a specific backend instance.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = BackendChoice::Instance(backend);
        self
    }

    /// Build the backend per invocation from its state.
    #[must_use]
    pub fn backend_factory(
        mut self,
        factory: impl Fn(&AgentState) -> Arc<dyn Backend> + Send + Sync + 'static,
    ) -> Self {
        self.backend = BackendChoice::Factory(Arc::new(factory));
        self
    }

    /// Evict tool results whose encoding exceeds this many bytes.
    #[must_use]
    pub const fn tool_result_eviction_limit(mut self, limit: usize) -> Self {
        self.eviction_limit = Some(limit);
        self
    }

    /// Mark the system message with provider cache metadata.
    #[must_use]
    pub const fn enable_prompt_caching(mut self, enable: bool) -> Self {
        self.enable_prompt_caching = enable;
        self
    }

    /// Configure conversation summarization.
    #[must_use]
    pub fn summarization(mut self, options: SummarizationOptions) -> Self {
        self.summarization = options;
        self
    }

    /// Require approval for a tool.
    #[must_use]
    pub fn interrupt_on(mut self, tool: impl Into<String>, policy: InterruptPolicy) -> Self {
        self.interrupt_on.insert(tool.into(), policy);
        self
    }

    /// Persist checkpoints through this store.
    #[must_use]
    pub fn checkpointer(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpointer = Some(store);
        self
    }

    /// Load a skills index from this directory.
    #[must_use]
    pub fn skills_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skills_dir = Some(dir.into());
        self
    }

    /// Load the skills index for a named agent
    /// (`~/.fathom/agents/<id>/skills`).
    #[must_use]
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Require structured output matching a JSON schema.
    #[must_use]
    pub fn output(mut self, spec: OutputSpec) -> Self {
        self.output = Some(spec);
        self
    }

    /// Set loop-control callbacks and stop conditions.
    #[must_use]
    pub fn loop_control(mut self, control: LoopControl) -> Self {
        self.loop_control = control;
        self
    }

    /// Set sampling and retry options.
    #[must_use]
    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation_options = options;
        self
    }

    /// Set telemetry/provider passthrough and tool constraints.
    #[must_use]
    pub fn advanced_options(mut self, options: AdvancedOptions) -> Self {
        self.advanced_options = options;
        self
    }

    /// Set a default approval handler for every run.
    #[must_use]
    pub fn approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = Some(handler);
        self
    }

    /// Build the agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no model is set, the output
    /// schema is malformed, or a sub-agent declaration is invalid.
    pub fn build(self) -> Result<DeepAgent> {
        let model = self
            .model
            .ok_or_else(|| Error::config("a model is required"))?;
        let model = apply_middleware(model, &self.middleware);

        if let Some(spec) = &self.output
            && !spec.schema.is_object()
        {
            return Err(Error::config("output schema must be a JSON schema object"));
        }

        let mut seen = Vec::new();
        for spec in &self.subagents {
            if spec.name.is_empty() {
                return Err(Error::config("every sub-agent needs a name"));
            }
            if spec.description.is_empty() {
                return Err(Error::config(format!(
                    "sub-agent '{}' needs a description",
                    spec.name
                )));
            }
            if spec.name == GENERAL_PURPOSE_AGENT {
                return Err(Error::config(format!(
                    "sub-agent name '{}' is reserved",
                    spec.name
                )));
            }
            if seen.contains(&spec.name) {
                return Err(Error::config(format!(
                    "duplicate sub-agent name '{}'",
                    spec.name
                )));
            }
            seen.push(spec.name.clone());
        }

        let skills: Vec<SkillInfo> = self
            .skills_dir
            .or_else(|| {
                self.agent_id
                    .as_deref()
                    .and_then(skills_dir_for_agent)
            })
            .map(|dir| load_skills_index(&dir))
            .unwrap_or_default();

        Ok(DeepAgent::from_config(AgentConfig {
            model,
            name: self.name.unwrap_or_else(|| "agent".to_owned()),
            system_prompt: self.system_prompt,
            user_tools: self.user_tools,
            subagents: self.subagents,
            include_general_purpose_agent: self.include_general_purpose_agent,
            max_steps: self.max_steps,
            backend: self.backend,
            eviction_limit: self.eviction_limit,
            enable_prompt_caching: self.enable_prompt_caching,
            summarization: self.summarization,
            interrupt_on: self.interrupt_on,
            checkpointer: self.checkpointer,
            skills,
            output: self.output,
            loop_control: self.loop_control,
            generation_options: self.generation_options,
            advanced_options: self.advanced_options,
            approval_handler: self.approval_handler,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock::MockModel;
    use serde_json::json;

    #[test]
    fn build_requires_model() {
        let err = AgentBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_with_model_succeeds() {
        let agent = AgentBuilder::new()
            .model(MockModel::from_text("hi"))
            .build()
            .unwrap();
        assert_eq!(agent.model_id(), "mock-model");
    }

    #[test]
    fn output_schema_must_be_object() {
        let err = AgentBuilder::new()
            .model(MockModel::from_text("hi"))
            .output(OutputSpec::new(json!("not a schema")))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn subagents_need_unique_names() {
        let err = AgentBuilder::new()
            .model(MockModel::from_text("hi"))
            .subagent(SubagentSpec::new("researcher", "finds things"))
            .subagent(SubagentSpec::new("researcher", "finds more things"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn reserved_subagent_name_rejected() {
        let err = AgentBuilder::new()
            .model(MockModel::from_text("hi"))
            .subagent(SubagentSpec::new(GENERAL_PURPOSE_AGENT, "nope"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
