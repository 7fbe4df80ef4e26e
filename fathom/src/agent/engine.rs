//! The execution engine: the model/tool loop behind every run.
//!
//! [`run_engine`] drives one invocation to completion:
//!
//! 1. load the thread checkpoint and resolve the input messages
//! 2. patch dangling tool calls, summarize if over the threshold
//! 3. per step: stream the model, execute tool calls serially
//!    (pausing for approval where policy requires it), emit events,
//!    run the user's step callback, then save the step checkpoint
//! 4. stop when a stop condition fires or the model stops calling
//!    tools, then emit the terminal `done` and the final checkpoint
//!
//! The returned stream never yields an error to the caller; failures
//! become `error` events and terminate the stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt as _;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::approval::{
    ApprovalHandler, ApprovalRequest, DENIED_RESULT, InterruptPolicy, PendingInterrupt,
    ResumeDecision,
};
use crate::backend::Backend;
use crate::cancel::CancelToken;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{Error, ModelError};
use crate::event::{AgentEvent, EventQueue, EventStream};
use crate::evict::maybe_evict;
use crate::history::{ResolvedInput, has_user_content, resolve_messages};
use crate::message::{Message, ToolCallRequest, patch_dangling_tool_calls};
use crate::model::{GenerationOptions, ModelChunk, ModelClient, ModelRequest};
use crate::state::AgentState;
use crate::summarize::{SummarizationOptions, maybe_summarize};
use crate::tool::{ToolBox, ToolContext, result_content};

use super::config::{AdvancedOptions, LoopControl, StepContext, StepOutcome, StepOverride};
use super::result::RunOutcome;

/// Everything one engine invocation needs, fully resolved.
pub(crate) struct EngineParams {
    pub model: Arc<dyn ModelClient>,
    pub agent_name: String,
    pub system_prompt: Option<String>,
    pub enable_prompt_caching: bool,
    pub toolbox: ToolBox,
    pub interrupt_on: HashMap<String, InterruptPolicy>,
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
    pub state: AgentState,
    pub backend: Arc<dyn Backend>,
    pub events: EventQueue,
    pub checkpointer: Option<Arc<dyn CheckpointStore>>,
    pub thread_id: Option<String>,
    pub resume: Option<Vec<ResumeDecision>>,
    pub prompt: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub summarization: SummarizationOptions,
    pub eviction_limit: Option<usize>,
    pub output_schema: Option<Value>,
    pub loop_control: LoopControl,
    pub generation_options: GenerationOptions,
    pub advanced_options: AdvancedOptions,
    pub max_steps: usize,
    pub cancel: CancelToken,
}

/// Build the system message for a request, carrying cache metadata
/// when prompt caching is enabled.
fn system_message(prompt: Option<&String>, enable_caching: bool) -> Option<Message> {
    let content = prompt.filter(|content| !content.is_empty())?;
    let mut message = Message::system(content.clone());
    if enable_caching {
        message =
            message.with_provider_options(json!({"cache_control": {"type": "ephemeral"}}));
    }
    Some(message)
}

/// Minimal validation of structured output against the schema.
fn parse_structured_output(text: &str, schema: &Value) -> Result<Value, String> {
    let parsed: Value = serde_json::from_str(text.trim())
        .map_err(|err| format!("final text is not valid JSON: {err}"))?;
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let actual = match &parsed {
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
        };
        if expected != actual {
            return Err(format!("expected {expected} output, got {actual}"));
        }
    }
    Ok(parsed)
}

/// Drive one invocation, yielding the ordered event sequence.
#[allow(clippy::too_many_lines)]
pub(crate) fn run_engine(params: EngineParams) -> EventStream {
    let EngineParams {
        model,
        agent_name,
        system_prompt,
        enable_prompt_caching,
        toolbox,
        interrupt_on,
        approval_handler,
        state,
        backend,
        events,
        checkpointer,
        thread_id,
        resume,
        prompt,
        messages: explicit_messages,
        summarization,
        eviction_limit,
        output_schema,
        loop_control,
        generation_options,
        advanced_options,
        max_steps,
        cancel,
    } = params;

    Box::pin(stream! {
        info!(
            agent = %agent_name,
            model = %model.model_id(),
            max_steps,
            "run started"
        );

        if prompt.is_none()
            && explicit_messages.is_none()
            && resume.is_none()
            && thread_id.is_none()
        {
            yield AgentEvent::from_error(&Error::input(
                "one of prompt, messages, resume, or thread_id is required",
            ));
            return;
        }

        // -- checkpoint load -------------------------------------------------
        let mut base_step = 0usize;
        let mut history: Vec<Message> = Vec::new();
        let mut open_interrupt: Option<PendingInterrupt> = None;
        let mut loaded = false;

        if let (Some(store), Some(thread)) = (checkpointer.as_ref(), thread_id.as_ref()) {
            match store.load(thread).await {
                Ok(Some(checkpoint)) => {
                    base_step = checkpoint.step;
                    history = checkpoint.messages;
                    open_interrupt = checkpoint.interrupt;
                    state.restore(checkpoint.state);
                    loaded = true;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(thread = %thread, error = %err, "checkpoint load failed; starting fresh");
                }
            }
            if loaded {
                yield AgentEvent::CheckpointLoaded {
                    thread_id: thread.clone(),
                    step: base_step,
                };
            }
        }

        // -- input resolution ------------------------------------------------
        let resolved = resolve_messages(
            prompt,
            explicit_messages,
            history,
            resume.is_some() || loaded,
        );
        let (mut messages, appended_user) = match resolved {
            ResolvedInput::NoOp => {
                yield AgentEvent::Done {
                    state: state.snapshot(),
                    text: None,
                    messages: Vec::new(),
                    output: None,
                };
                return;
            }
            ResolvedInput::Run {
                messages,
                appended_user,
            } => (messages, appended_user),
        };

        for content in appended_user {
            yield AgentEvent::UserMessage { content };
        }

        patch_dangling_tool_calls(&mut messages);

        messages = maybe_summarize(
            messages,
            &summarization,
            &model,
            &generation_options,
            advanced_options.telemetry.as_ref(),
            advanced_options.provider_options.as_ref(),
        )
        .await;

        if !has_user_content(&messages) && resume.is_none() && open_interrupt.is_none() {
            yield AgentEvent::from_error(&Error::input(
                "no user content to run and nothing to resume",
            ));
            return;
        }

        let base_ctx = ToolContext::new(
            state.clone(),
            Arc::clone(&backend),
            events.clone(),
            cancel.clone(),
        );

        // -- pending interrupt from a previous run ---------------------------
        if let Some(interrupt) = open_interrupt.take() {
            let decision = resume
                .as_ref()
                .and_then(|decisions| {
                    decisions
                        .iter()
                        .find(|decision| decision.approval_id == interrupt.approval_id)
                })
                .map(|decision| decision.decision);

            match decision {
                Some(decision) => {
                    yield AgentEvent::ApprovalResponse {
                        approval_id: interrupt.approval_id.clone(),
                        approved: decision.is_approved(),
                    };
                    if decision.is_approved() {
                        // Replay the recorded call and swap the denied
                        // result before the loop continues.
                        let ctx = base_ctx.with_tool_call_id(&interrupt.tool_call_id);
                        let (value, is_error) = match toolbox
                            .execute(&interrupt.tool_name, interrupt.arguments.clone(), &ctx)
                            .await
                        {
                            Ok(value) => (value, false),
                            Err(err) => (Value::String(format!("Tool error: {err}")), true),
                        };
                        for event in events.drain() {
                            yield event;
                        }
                        let content = result_content(&value);
                        if let Some(message) = messages.iter_mut().find(|message| {
                            message.tool_call_id.as_deref()
                                == Some(interrupt.tool_call_id.as_str())
                        }) {
                            message.content = content;
                        }
                        yield AgentEvent::ToolResult {
                            name: interrupt.tool_name.clone(),
                            id: interrupt.tool_call_id.clone(),
                            result: value,
                            is_error,
                        };
                    }
                }
                None => {
                    // No matching decision: the interrupt stays pending.
                    open_interrupt = Some(interrupt);
                }
            }
        }

        // -- the step loop ---------------------------------------------------
        let mut step = base_step;
        let mut final_text = String::new();

        loop {
            if cancel.is_cancelled() {
                for event in events.drain() {
                    yield event;
                }
                yield AgentEvent::from_error(&Error::Cancelled);
                return;
            }

            step += 1;
            debug!(agent = %agent_name, step, "starting step");
            yield AgentEvent::StepStart { step };

            // Per-step override from the user's prepare_step.
            let mut step_override = StepOverride::default();
            if let Some(prepare) = &loop_control.prepare_step {
                let context = StepContext {
                    step,
                    messages: messages.clone(),
                };
                match prepare(&context) {
                    Ok(overrides) => step_override = overrides,
                    Err(err) => {
                        warn!(step, error = %err, "prepare_step failed; using defaults");
                    }
                }
            }

            let step_model = step_override
                .model
                .clone()
                .unwrap_or_else(|| Arc::clone(&model));
            let active_tools = step_override
                .active_tools
                .clone()
                .or_else(|| advanced_options.active_tools.clone());
            let step_toolbox = match &active_tools {
                Some(active) => toolbox.filtered(active),
                None => toolbox.clone(),
            };
            let tool_choice = step_override
                .tool_choice
                .clone()
                .or_else(|| advanced_options.tool_choice.clone());

            let mut request_messages = Vec::with_capacity(messages.len() + 1);
            if let Some(system) =
                system_message(system_prompt.as_ref(), enable_prompt_caching)
            {
                request_messages.push(system);
            }
            request_messages.extend(messages.iter().cloned());

            let request = ModelRequest {
                messages: request_messages,
                tools: step_toolbox.definitions(),
                tool_choice,
                options: generation_options.clone(),
                provider_options: advanced_options.provider_options.clone(),
                telemetry: advanced_options.telemetry.clone(),
                output_schema: output_schema.clone(),
            };

            // Model call with retries.
            let mut attempts = 0u32;
            let step_result: Result<(String, Vec<ToolCallRequest>), ModelError> = loop {
                if cancel.is_cancelled() {
                    break Err(ModelError::call("cancelled"));
                }
                match step_model.stream(request.clone()).await {
                    Ok(mut chunks) => {
                        let mut text = String::new();
                        let mut calls: Vec<ToolCallRequest> = Vec::new();
                        let mut failure: Option<ModelError> = None;

                        while let Some(chunk) = chunks.next().await {
                            if cancel.is_cancelled() {
                                failure = Some(ModelError::stream("cancelled"));
                                break;
                            }
                            // Queued tool events are delivered before any
                            // chunk that causally follows them.
                            for event in events.drain() {
                                yield event;
                            }
                            match chunk {
                                Ok(ModelChunk::TextDelta { text: delta }) => {
                                    text.push_str(&delta);
                                    yield AgentEvent::Text { text: delta };
                                }
                                Ok(ModelChunk::ToolCall { call }) => {
                                    yield AgentEvent::ToolCall {
                                        name: call.name.clone(),
                                        id: call.id.clone(),
                                        args: call.arguments.clone(),
                                    };
                                    calls.push(call);
                                }
                                Ok(ModelChunk::Finish { .. }) => {}
                                Err(err) => {
                                    failure = Some(err);
                                    break;
                                }
                            }
                        }

                        match failure {
                            None => break Ok((text, calls)),
                            Some(err) => {
                                if cancel.is_cancelled() || attempts >= generation_options.max_retries {
                                    break Err(err);
                                }
                                attempts += 1;
                                warn!(step, attempt = attempts, error = %err, "model stream failed; retrying");
                            }
                        }
                    }
                    Err(err) => {
                        if attempts >= generation_options.max_retries {
                            break Err(err);
                        }
                        attempts += 1;
                        warn!(step, attempt = attempts, error = %err, "model call failed; retrying");
                    }
                }
            };

            let (step_text, calls) = match step_result {
                Ok(result) => result,
                Err(err) => {
                    if cancel.is_cancelled() {
                        for event in events.drain() {
                            yield event;
                        }
                        yield AgentEvent::from_error(&Error::Cancelled);
                        return;
                    }
                    error!(agent = %agent_name, step, error = %err, "model failed after retries");
                    yield AgentEvent::from_error(&Error::Model(err));
                    return;
                }
            };

            if !step_text.is_empty() {
                yield AgentEvent::TextSegment {
                    text: step_text.clone(),
                };
            }
            if !step_text.is_empty() || !calls.is_empty() {
                messages.push(Message::assistant_with_tool_calls(
                    step_text.clone(),
                    calls.clone(),
                ));
            }
            final_text = step_text.clone();

            // -- tool execution, strictly serialized -------------------------
            for call in &calls {
                if cancel.is_cancelled() {
                    for event in events.drain() {
                        yield event;
                    }
                    yield AgentEvent::from_error(&Error::Cancelled);
                    return;
                }

                // Approval interception.
                let needs_approval = interrupt_on
                    .get(&call.name)
                    .is_some_and(|policy| policy.requires_approval(&call.arguments));
                if needs_approval {
                    let approval = ApprovalRequest {
                        approval_id: Uuid::new_v4().to_string(),
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    };
                    yield AgentEvent::ApprovalRequested {
                        approval_id: approval.approval_id.clone(),
                        tool_call_id: approval.tool_call_id.clone(),
                        tool_name: approval.tool_name.clone(),
                        args: approval.arguments.clone(),
                    };
                    let decision = match &approval_handler {
                        Some(handler) => handler.on_approval_request(&approval).await,
                        None => crate::approval::ApprovalDecision::Deny,
                    };
                    yield AgentEvent::ApprovalResponse {
                        approval_id: approval.approval_id.clone(),
                        approved: decision.is_approved(),
                    };
                    if !decision.is_approved() {
                        open_interrupt = Some(PendingInterrupt::from(&approval));
                        messages.push(Message::tool(&call.id, DENIED_RESULT));
                        yield AgentEvent::ToolResult {
                            name: call.name.clone(),
                            id: call.id.clone(),
                            result: Value::String(DENIED_RESULT.to_owned()),
                            is_error: false,
                        };
                        continue;
                    }
                }

                let ctx = base_ctx.with_tool_call_id(&call.id);
                let (value, is_error) = match step_toolbox
                    .execute(&call.name, call.arguments.clone(), &ctx)
                    .await
                {
                    Ok(value) => (value, false),
                    Err(err) => {
                        warn!(tool = %call.name, error = %err, "tool execution failed");
                        (Value::String(format!("Tool error: {err}")), true)
                    }
                };

                // The tool's own events precede its result.
                for event in events.drain() {
                    yield event;
                }

                let value = if is_error {
                    value
                } else {
                    maybe_evict(value, &call.id, backend.as_ref(), eviction_limit).await
                };

                messages.push(Message::tool(&call.id, result_content(&value)));
                yield AgentEvent::ToolResult {
                    name: call.name.clone(),
                    id: call.id.clone(),
                    result: value,
                    is_error,
                };
            }

            for event in events.drain() {
                yield event;
            }

            // -- step finish: user callback first, then durability -----------
            let outcome = StepOutcome {
                step,
                text: step_text,
                tool_calls: calls.clone(),
            };
            if let Some(callback) = &loop_control.on_step_finish {
                if let Err(err) = callback(&outcome) {
                    warn!(step, error = %err, "on_step_finish failed");
                }
            }
            yield AgentEvent::StepFinish {
                step,
                tool_calls: calls.clone(),
            };

            if let (Some(store), Some(thread)) = (checkpointer.as_ref(), thread_id.as_ref()) {
                let mut checkpoint =
                    Checkpoint::new(thread.clone(), step, messages.clone(), state.snapshot());
                checkpoint.interrupt = open_interrupt.clone();
                match store.save(checkpoint).await {
                    Ok(()) => {
                        yield AgentEvent::CheckpointSaved {
                            thread_id: thread.clone(),
                            step,
                        };
                    }
                    Err(err) => {
                        warn!(thread = %thread, step, error = %err, "checkpoint save failed");
                    }
                }
            }

            // -- stop evaluation: safety first, then user conditions ---------
            let safety_fired = step - base_step >= max_steps;
            let user_fired = loop_control
                .stop_when
                .iter()
                .any(|condition| condition(&outcome));
            if safety_fired {
                info!(agent = %agent_name, step, "max steps reached");
                break;
            }
            if user_fired {
                debug!(agent = %agent_name, step, "stop condition fired");
                break;
            }
            if calls.is_empty() {
                break;
            }
        }

        // -- structured output ------------------------------------------------
        let mut output = None;
        let mut output_error = None;
        if let Some(schema) = &output_schema {
            match parse_structured_output(&final_text, schema) {
                Ok(value) => output = Some(value),
                Err(message) => output_error = Some(message),
            }
        }

        // -- final checkpoint (interrupt cleared) ------------------------------
        if let (Some(store), Some(thread)) = (checkpointer.as_ref(), thread_id.as_ref()) {
            let checkpoint =
                Checkpoint::new(thread.clone(), step, messages.clone(), state.snapshot());
            match store.save(checkpoint).await {
                Ok(()) => {
                    yield AgentEvent::CheckpointSaved {
                        thread_id: thread.clone(),
                        step,
                    };
                }
                Err(err) => {
                    warn!(thread = %thread, step, error = %err, "final checkpoint save failed");
                }
            }
        }

        if let Some(message) = output_error {
            yield AgentEvent::from_error(&Error::output(message));
            return;
        }

        let run_outcome = RunOutcome {
            text: final_text.clone(),
            messages: messages.clone(),
            state: state.snapshot(),
            output: output.clone(),
            steps: step - base_step,
        };
        if let Some(callback) = &loop_control.on_finish {
            if let Err(err) = callback(&run_outcome) {
                warn!(error = %err, "on_finish failed");
            }
        }

        info!(agent = %agent_name, steps = step - base_step, "run completed");
        yield AgentEvent::Done {
            state: state.snapshot(),
            text: (!final_text.is_empty()).then(|| final_text.clone()),
            messages,
            output,
        };
    })
}
