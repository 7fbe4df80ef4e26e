//! The deep agent: configuration, builder, and run entry points.
//!
//! A [`DeepAgent`] is an immutable configuration plus a family of run
//! operations. Each run allocates fresh state unless the caller
//! supplies one, and produces a single ordered event stream; the
//! blocking entry points fold that stream into a [`RunOutcome`].
//!
//! # Example
//!
//! ```rust,ignore
//! let agent = DeepAgent::builder()
//!     .model(model)
//!     .system_prompt("You are a research assistant.")
//!     .build()?;
//!
//! let outcome = agent.generate("Summarize /notes.md").await?;
//! println!("{}", outcome.text);
//! ```

mod builder;
mod config;
mod engine;
mod options;
mod result;

pub use builder::AgentBuilder;
pub use config::{
    AdvancedOptions, DEFAULT_MAX_STEPS, FinishCallback, LoopControl, OutputSpec, PrepareStep,
    StepCallback, StepContext, StepOutcome, StepOverride, StopCondition,
};
pub use options::RunOptions;
pub use result::RunOutcome;

pub(crate) use config::AgentConfig;
pub(crate) use engine::{EngineParams, run_engine};

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt as _};

use crate::error::{Error, ModelError, Result};
use crate::event::{AgentEvent, EventQueue, EventStream};
use crate::skills::render_skills_section;
use crate::state::AgentState;
use crate::tool::ToolBox;
use crate::tools::{TaskTool, builtin_tools};

/// Boxed stream of assistant text deltas.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Default system prompt when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable agent working on a \
long-running task. Plan with the write_todos tool and keep the list current. \
Use the filesystem tools (ls, read_file, write_file, edit_file, glob, grep) \
to inspect and change files. Delegate self-contained work to sub-agents with \
the task tool when it is available. When the task is finished, reply with the \
final answer as plain text.";

/// A configured deep agent.
///
/// Cheap to clone; one instance may be reused across runs.
#[derive(Clone, Debug)]
pub struct DeepAgent {
    config: Arc<AgentConfig>,
}

impl DeepAgent {
    /// Create a new agent builder.
    #[inline]
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub(crate) fn from_config(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Identifier of the configured model.
    #[must_use]
    pub fn model_id(&self) -> &str {
        self.config.model.model_id()
    }

    /// Run to completion and return the final result.
    ///
    /// # Errors
    ///
    /// Mirrors the underlying failure: [`Error::Model`] after retries,
    /// [`Error::Cancelled`] on abort, [`Error::Input`] for unusable
    /// input, [`Error::Output`] when structured output validation
    /// fails.
    pub async fn generate(&self, options: impl Into<RunOptions>) -> Result<RunOutcome> {
        let mut options = options.into();
        options.state.get_or_insert_with(AgentState::new);
        let mut stream = self.stream_events(options);

        let mut steps = 0usize;
        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::StepFinish { .. } => steps += 1,
                AgentEvent::Done {
                    state,
                    text,
                    messages,
                    output,
                } => {
                    return Ok(RunOutcome {
                        text: text.unwrap_or_default(),
                        messages,
                        state,
                        output,
                        steps,
                    });
                }
                AgentEvent::Error { kind, error } => {
                    return Err(rebuild_error(&kind, error));
                }
                _ => {}
            }
        }
        Err(Error::input("event stream ended without a terminal event"))
    }

    /// Run with caller-owned state, mutating it in place.
    ///
    /// # Errors
    ///
    /// Same as [`DeepAgent::generate`].
    pub async fn generate_with_state(
        &self,
        options: impl Into<RunOptions>,
        state: AgentState,
    ) -> Result<RunOutcome> {
        let options = options.into().state(state);
        self.generate(options).await
    }

    /// Stream assistant text deltas only.
    #[must_use]
    pub fn stream(&self, options: impl Into<RunOptions>) -> TextStream {
        let events = self.stream_events(options);
        Box::pin(events.filter_map(|event| async move {
            match event {
                AgentEvent::Text { text } => Some(text),
                _ => None,
            }
        }))
    }

    /// Stream the full event sequence for a run.
    ///
    /// Never yields an error to the caller; failures are delivered as
    /// terminal `error` events.
    #[must_use]
    pub fn stream_events(&self, options: impl Into<RunOptions>) -> EventStream {
        let options = options.into();
        let config = &self.config;

        let state = options.state.unwrap_or_default();
        let cancel = options.cancel.unwrap_or_default();
        let backend = config.backend.resolve(&state);

        // Assemble the per-invocation tool set: built-ins, the task
        // dispatcher when sub-agents are available, then user tools.
        let mut toolbox = ToolBox::new();
        for tool in builtin_tools(backend.as_sandbox().is_some()) {
            toolbox.add_shared(tool);
        }
        if config.include_general_purpose_agent || !config.subagents.is_empty() {
            toolbox.add_shared(Arc::new(TaskTool::new(
                config.subagents.clone(),
                config.include_general_purpose_agent,
                Arc::clone(&config.model),
                config.user_tools.clone(),
                config.backend.clone(),
                config.generation_options.clone(),
                config.advanced_options.clone(),
                config.eviction_limit,
            )));
        }
        for tool in &config.user_tools {
            toolbox.add_shared(Arc::clone(tool));
        }

        let mut system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned());
        system_prompt.push_str(&render_skills_section(&config.skills));

        run_engine(EngineParams {
            model: Arc::clone(&config.model),
            agent_name: config.name.clone(),
            system_prompt: Some(system_prompt),
            enable_prompt_caching: config.enable_prompt_caching,
            toolbox,
            interrupt_on: config.interrupt_on.clone(),
            approval_handler: options
                .approval_handler
                .or_else(|| config.approval_handler.clone()),
            state,
            backend,
            events: EventQueue::new(),
            checkpointer: config.checkpointer.clone(),
            thread_id: options.thread_id,
            resume: options.resume,
            prompt: options.prompt,
            messages: options.messages,
            summarization: config.summarization.clone(),
            eviction_limit: config.eviction_limit,
            output_schema: config.output.as_ref().map(|spec| spec.schema.clone()),
            loop_control: config.loop_control.clone(),
            generation_options: config.generation_options.clone(),
            advanced_options: config.advanced_options.clone(),
            max_steps: options.max_steps.unwrap_or(config.max_steps),
            cancel,
        })
    }

    /// Run, delivering every event to `callback`, and return the final
    /// outcome. Failures surface as `error` events, never as panics or
    /// return errors.
    pub async fn stream_with_callback(
        &self,
        options: impl Into<RunOptions>,
        mut callback: impl FnMut(AgentEvent),
    ) -> RunOutcome {
        let mut options = options.into();
        let state = options.state.get_or_insert_with(AgentState::new).clone();
        let mut stream = self.stream_events(options);

        let mut outcome = RunOutcome::default();
        let mut steps = 0usize;
        while let Some(event) = stream.next().await {
            match &event {
                AgentEvent::StepFinish { .. } => steps += 1,
                AgentEvent::Done {
                    state,
                    text,
                    messages,
                    output,
                } => {
                    outcome = RunOutcome {
                        text: text.clone().unwrap_or_default(),
                        messages: messages.clone(),
                        state: state.clone(),
                        output: output.clone(),
                        steps,
                    };
                }
                AgentEvent::Error { .. } => {
                    outcome.state = state.snapshot();
                    outcome.steps = steps;
                }
                _ => {}
            }
            callback(event);
        }
        outcome
    }

    /// A handle pre-bound to the given state.
    #[must_use]
    pub fn agent_with_state(&self, state: AgentState) -> BoundAgent {
        BoundAgent {
            agent: self.clone(),
            state,
        }
    }
}

/// An agent handle pre-bound to one [`AgentState`].
#[derive(Clone, Debug)]
pub struct BoundAgent {
    agent: DeepAgent,
    state: AgentState,
}

impl BoundAgent {
    /// The bound state.
    #[must_use]
    pub const fn state(&self) -> &AgentState {
        &self.state
    }

    /// Run to completion against the bound state.
    ///
    /// # Errors
    ///
    /// Same as [`DeepAgent::generate`].
    pub async fn generate(&self, options: impl Into<RunOptions>) -> Result<RunOutcome> {
        let options = options.into().state(self.state.clone());
        self.agent.generate(options).await
    }

    /// Stream events against the bound state.
    #[must_use]
    pub fn stream_events(&self, options: impl Into<RunOptions>) -> EventStream {
        let options = options.into().state(self.state.clone());
        self.agent.stream_events(options)
    }
}

/// Reconstruct a typed error from a terminal `error` event.
fn rebuild_error(kind: &str, message: String) -> Error {
    match kind {
        "cancelled" => Error::Cancelled,
        "model" => Error::Model(ModelError::Call(message)),
        "output" => Error::Output(message),
        _ => Error::Input(message),
    }
}
