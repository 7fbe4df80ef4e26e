//! Conversation summarization for context-window management.
//!
//! When the estimated token count of the history crosses the
//! threshold, the prefix up to a pair-safe boundary is replaced by one
//! synthetic assistant message wrapping the summary in
//! `<summary>…</summary>`; the keep-tail is preserved verbatim. The
//! summary itself comes from exactly one model call that carries the
//! engine's generation options and telemetry/provider passthrough.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::message::{Message, Role};
use crate::model::{GenerationOptions, ModelClient, ModelRequest, generate_text};

/// Default token threshold above which summarization triggers.
pub const DEFAULT_TOKEN_THRESHOLD: usize = 170_000;

/// Default number of tail messages preserved verbatim.
pub const DEFAULT_KEEP_MESSAGES: usize = 6;

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation so a \
colleague could pick up the task. Keep concrete facts: goals, decisions, file \
paths, tool outcomes, and open problems. Reply with the summary only.";

/// Summarization configuration.
#[derive(Clone, Default)]
pub struct SummarizationOptions {
    /// Whether summarization runs at all.
    pub enabled: bool,
    /// Estimated-token threshold that triggers summarization.
    pub token_threshold: usize,
    /// Number of tail messages preserved verbatim (at least).
    pub keep_messages: usize,
    /// Dedicated summarizer model; defaults to the engine's model.
    pub model: Option<Arc<dyn ModelClient>>,
}

impl SummarizationOptions {
    /// Enabled options with the default threshold and keep-tail.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            keep_messages: DEFAULT_KEEP_MESSAGES,
            model: None,
        }
    }

    /// Override the token threshold.
    #[must_use]
    pub const fn with_token_threshold(mut self, threshold: usize) -> Self {
        self.token_threshold = threshold;
        self
    }

    /// Override the keep-tail length.
    #[must_use]
    pub const fn with_keep_messages(mut self, keep: usize) -> Self {
        self.keep_messages = keep;
        self
    }

    /// Use a dedicated summarizer model.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }
}

impl fmt::Debug for SummarizationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizationOptions")
            .field("enabled", &self.enabled)
            .field("token_threshold", &self.token_threshold)
            .field("keep_messages", &self.keep_messages)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}

/// Estimate the token count of a message sequence (characters / 4).
#[must_use]
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|message| {
            let args: usize = message
                .tool_calls
                .iter()
                .map(|call| call.arguments.to_string().len() + call.name.len())
                .sum();
            message.content.len() + args
        })
        .sum();
    chars / 4
}

/// Find the summarization cut index: the latest index at or before
/// `len - keep` at which no tool-call / tool-result pair is split.
///
/// Returns `None` when no useful prefix exists.
pub(crate) fn summary_boundary(messages: &[Message], keep: usize) -> Option<usize> {
    let mut index = messages.len().checked_sub(keep)?;
    // A tool message always answers an assistant turn on its left;
    // cutting in front of it would strand the pair.
    while index > 0 && messages[index].role == Role::Tool {
        index -= 1;
    }
    (index > 0).then_some(index)
}

/// Render a prefix as a plain transcript for the summarizer.
fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| {
            let mut line = format!("{}: {}", message.role.as_str(), message.content);
            for call in &message.tool_calls {
                line.push_str(&format!(" [tool call {}({})]", call.name, call.arguments));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summarize the history if it crosses the threshold.
///
/// On summarizer failure the original history is returned unchanged.
pub(crate) async fn maybe_summarize(
    messages: Vec<Message>,
    options: &SummarizationOptions,
    engine_model: &Arc<dyn ModelClient>,
    generation_options: &GenerationOptions,
    telemetry: Option<&Value>,
    provider_options: Option<&Value>,
) -> Vec<Message> {
    if !options.enabled
        || estimate_tokens(&messages) <= options.token_threshold
        || messages.len() < options.keep_messages + 2
    {
        return messages;
    }

    let Some(boundary) = summary_boundary(&messages, options.keep_messages) else {
        return messages;
    };

    let prefix = &messages[..boundary];
    let request = ModelRequest {
        messages: vec![Message::user(format!(
            "{SUMMARY_INSTRUCTION}\n\n{}",
            render_transcript(prefix)
        ))],
        tools: Vec::new(),
        tool_choice: None,
        options: generation_options.clone(),
        provider_options: provider_options.cloned(),
        telemetry: telemetry.cloned(),
        output_schema: None,
    };

    let model = options.model.as_ref().unwrap_or(engine_model);
    match generate_text(model.as_ref(), request).await {
        Ok(generated) => {
            debug!(
                replaced = boundary,
                kept = messages.len() - boundary,
                "summarized conversation prefix"
            );
            let mut summarized =
                vec![Message::assistant(format!("<summary>{}</summary>", generated.text))];
            summarized.extend_from_slice(&messages[boundary..]);
            summarized
        }
        Err(err) => {
            warn!(error = %err, "summarization failed; keeping full history");
            messages
        }
    }
}
