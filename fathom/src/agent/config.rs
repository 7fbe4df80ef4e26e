//! Agent configuration types: loop control, advanced options, and the
//! resolved internal config the builder produces.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::approval::{ApprovalHandler, InterruptPolicy};
use crate::backend::BackendChoice;
use crate::checkpoint::CheckpointStore;
use crate::error::BoxError;
use crate::message::{Message, ToolCallRequest};
use crate::model::{GenerationOptions, ModelClient, ToolChoice};
use crate::skills::SkillInfo;
use crate::summarize::SummarizationOptions;
use crate::tool::SharedTool;
use crate::tools::SubagentSpec;

/// Default maximum number of steps for a run.
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Structured output configuration.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// JSON schema the final answer must satisfy.
    pub schema: Value,
    /// Optional description passed to the model adapter.
    pub description: Option<String>,
}

impl OutputSpec {
    /// Create an output spec from a schema.
    #[must_use]
    pub const fn new(schema: Value) -> Self {
        Self {
            schema,
            description: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Provider and telemetry passthrough plus per-run tool constraints.
#[derive(Debug, Clone, Default)]
pub struct AdvancedOptions {
    /// Telemetry metadata forwarded on every model call.
    pub telemetry: Option<Value>,
    /// Provider-specific options forwarded on every model call.
    pub provider_options: Option<Value>,
    /// Opaque caller context.
    pub context: Option<Value>,
    /// Tool-choice constraint.
    pub tool_choice: Option<ToolChoice>,
    /// Restrict the run to these tools.
    pub active_tools: Option<Vec<String>>,
}

impl AdvancedOptions {
    /// Merge `child` on top of `parent`: child fields win when set, so
    /// telemetry propagates to sub-agents unless explicitly overridden.
    #[must_use]
    pub fn merged(parent: &Self, child: &Self) -> Self {
        Self {
            telemetry: child.telemetry.clone().or_else(|| parent.telemetry.clone()),
            provider_options: child
                .provider_options
                .clone()
                .or_else(|| parent.provider_options.clone()),
            context: child.context.clone().or_else(|| parent.context.clone()),
            tool_choice: child
                .tool_choice
                .clone()
                .or_else(|| parent.tool_choice.clone()),
            active_tools: child
                .active_tools
                .clone()
                .or_else(|| parent.active_tools.clone()),
        }
    }
}

/// Snapshot of one finished step, handed to `on_step_finish` and to
/// stop conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The step number.
    pub step: usize,
    /// Assistant text produced in the step.
    pub text: String,
    /// Tool calls made in the step.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Context handed to `prepare_step`.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The step about to run.
    pub step: usize,
    /// The conversation so far.
    pub messages: Vec<Message>,
}

/// Per-step overrides returned by `prepare_step`.
#[derive(Clone, Default)]
pub struct StepOverride {
    /// Override the tool-choice constraint for this step.
    pub tool_choice: Option<ToolChoice>,
    /// Override the model for this step.
    pub model: Option<Arc<dyn ModelClient>>,
    /// Override the active tool set for this step.
    pub active_tools: Option<Vec<String>>,
}

impl fmt::Debug for StepOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOverride")
            .field("tool_choice", &self.tool_choice)
            .field("has_model", &self.model.is_some())
            .field("active_tools", &self.active_tools)
            .finish()
    }
}

/// Stop condition predicate over accumulated run data.
pub type StopCondition = Arc<dyn Fn(&StepOutcome) -> bool + Send + Sync>;

/// Per-step preparation callback; an `Err` falls back to defaults.
pub type PrepareStep =
    Arc<dyn Fn(&StepContext) -> Result<StepOverride, BoxError> + Send + Sync>;

/// Step-finish callback; errors are caught and logged.
pub type StepCallback = Arc<dyn Fn(&StepOutcome) -> Result<(), BoxError> + Send + Sync>;

/// Run-finish callback; errors are caught and logged.
pub type FinishCallback =
    Arc<dyn Fn(&crate::agent::RunOutcome) -> Result<(), BoxError> + Send + Sync>;

/// User callbacks composed into the engine loop.
///
/// User callbacks run before the engine's own per-step work, and a
/// user-side error can never break checkpoint durability.
#[derive(Clone, Default)]
pub struct LoopControl {
    /// Adjust model/tool-choice/tools before each step.
    pub prepare_step: Option<PrepareStep>,
    /// Observe each finished step.
    pub on_step_finish: Option<StepCallback>,
    /// Observe the finished run.
    pub on_finish: Option<FinishCallback>,
    /// OR-composed stop conditions; the engine always prepends the
    /// max-steps safety condition.
    pub stop_when: Vec<StopCondition>,
}

impl LoopControl {
    /// Create empty loop control.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stop condition.
    #[must_use]
    pub fn stop_when(mut self, condition: impl Fn(&StepOutcome) -> bool + Send + Sync + 'static) -> Self {
        self.stop_when.push(Arc::new(condition));
        self
    }

    /// Set the prepare-step callback.
    #[must_use]
    pub fn prepare_step(
        mut self,
        callback: impl Fn(&StepContext) -> Result<StepOverride, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.prepare_step = Some(Arc::new(callback));
        self
    }

    /// Set the step-finish callback.
    #[must_use]
    pub fn on_step_finish(
        mut self,
        callback: impl Fn(&StepOutcome) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_step_finish = Some(Arc::new(callback));
        self
    }

    /// Set the run-finish callback.
    #[must_use]
    pub fn on_finish(
        mut self,
        callback: impl Fn(&crate::agent::RunOutcome) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for LoopControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopControl")
            .field("has_prepare_step", &self.prepare_step.is_some())
            .field("has_on_step_finish", &self.on_step_finish.is_some())
            .field("has_on_finish", &self.on_finish.is_some())
            .field("stop_conditions", &self.stop_when.len())
            .finish()
    }
}

/// Resolved, immutable engine configuration produced by the builder.
pub(crate) struct AgentConfig {
    pub model: Arc<dyn ModelClient>,
    pub name: String,
    pub system_prompt: Option<String>,
    pub user_tools: Vec<SharedTool>,
    pub subagents: Vec<SubagentSpec>,
    pub include_general_purpose_agent: bool,
    pub max_steps: usize,
    pub backend: BackendChoice,
    pub eviction_limit: Option<usize>,
    pub enable_prompt_caching: bool,
    pub summarization: SummarizationOptions,
    pub interrupt_on: HashMap<String, InterruptPolicy>,
    pub checkpointer: Option<Arc<dyn CheckpointStore>>,
    pub skills: Vec<SkillInfo>,
    pub output: Option<OutputSpec>,
    pub loop_control: LoopControl,
    pub generation_options: GenerationOptions,
    pub advanced_options: AdvancedOptions,
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("model", &self.model.model_id())
            .field("max_steps", &self.max_steps)
            .field("user_tools", &self.user_tools.len())
            .field("subagents", &self.subagents.len())
            .finish_non_exhaustive()
    }
}
