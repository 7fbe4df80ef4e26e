//! Model adapter types and traits.
//!
//! The engine treats the LLM as an opaque [`ModelClient`] producing a
//! stream of [`ModelChunk`]s. Concrete provider adapters live outside
//! this crate; [`mock::MockModel`] is shipped for tests and examples.

pub mod mock;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolDefinition;

/// Token usage for a model call or an accumulated run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a new usage record.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens in both directions.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Controls how the model may use tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides freely.
    Auto,
    /// The model must not call tools.
    None,
    /// The model must call some tool.
    Required,
    /// The model must call the named tool.
    Tool(String),
}

/// Sampling and retry settings forwarded to the model adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Sampling seed for reproducible runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Retries on model failure before the run gives up.
    pub max_retries: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            seed: None,
            stop_sequences: Vec::new(),
            max_retries: 2,
        }
    }
}

/// A single generation request sent to a [`ModelClient`].
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Conversation messages, system first.
    pub messages: Vec<Message>,
    /// Tools available for the model to call.
    pub tools: Vec<ToolDefinition>,
    /// Tool-choice constraint for this call.
    pub tool_choice: Option<ToolChoice>,
    /// Sampling settings.
    pub options: GenerationOptions,
    /// Provider passthrough options.
    pub provider_options: Option<Value>,
    /// Telemetry passthrough metadata.
    pub telemetry: Option<Value>,
    /// JSON schema the final answer must satisfy, when configured.
    pub output_schema: Option<Value>,
}

impl ModelRequest {
    /// Create a request from a message sequence.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Attach tool definitions.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach sampling settings.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// A chunk of a streaming model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ModelChunk {
    /// Incremental text content.
    TextDelta {
        /// The text fragment.
        text: String,
    },
    /// A complete tool call requested by the model.
    ToolCall {
        /// The requested call.
        call: ToolCallRequest,
    },
    /// The stream is complete.
    Finish {
        /// Token usage for this call, if the adapter reports it.
        usage: Option<TokenUsage>,
    },
}

impl ModelChunk {
    /// Create a text delta chunk.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Create a tool call chunk.
    #[must_use]
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::ToolCall {
            call: ToolCallRequest::new(id, name, arguments),
        }
    }

    /// Create a finish chunk.
    #[must_use]
    pub const fn finish(usage: Option<TokenUsage>) -> Self {
        Self::Finish { usage }
    }
}

/// Boxed stream of model chunks.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, ModelError>> + Send>>;

/// The opaque LLM adapter the engine drives.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Start a generation, returning a chunk stream.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}

/// Cross-cutting wrapper around a [`ModelClient`].
///
/// Middleware is the right place for LLM-wide concerns (telemetry,
/// caching, retrieval); control flow such as tool dispatch and approval
/// lives in the tool layer instead.
pub trait ModelMiddleware: Send + Sync {
    /// Wrap the inner client, returning the decorated client.
    fn wrap(&self, inner: Arc<dyn ModelClient>) -> Arc<dyn ModelClient>;
}

/// Fold a middleware stack around a model, first entry outermost.
#[must_use]
pub fn apply_middleware(
    model: Arc<dyn ModelClient>,
    middleware: &[Arc<dyn ModelMiddleware>],
) -> Arc<dyn ModelClient> {
    middleware
        .iter()
        .rev()
        .fold(model, |inner, layer| layer.wrap(inner))
}

/// Aggregated result of draining a model stream to completion.
#[derive(Debug, Clone, Default)]
pub struct GeneratedText {
    /// Accumulated text content.
    pub text: String,
    /// Tool calls collected from the stream.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Usage reported by the finish chunk, if any.
    pub usage: Option<TokenUsage>,
}

/// Drive a model call to completion, collecting text and tool calls.
///
/// Used by the summarizer and by sub-agent result collection; the main
/// loop consumes the stream incrementally instead.
pub async fn generate_text(
    model: &dyn ModelClient,
    request: ModelRequest,
) -> Result<GeneratedText, ModelError> {
    use futures::StreamExt as _;

    let mut stream = model.stream(request).await?;
    let mut generated = GeneratedText::default();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            ModelChunk::TextDelta { text } => generated.text.push_str(&text),
            ModelChunk::ToolCall { call } => generated.tool_calls.push(call),
            ModelChunk::Finish { usage } => generated.usage = usage,
        }
    }

    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod token_usage {
        use super::*;

        #[test]
        fn add_accumulates() {
            let total = TokenUsage::new(100, 50) + TokenUsage::new(10, 5);
            assert_eq!(total.input_tokens, 110);
            assert_eq!(total.output_tokens, 55);
            assert_eq!(total.total(), 165);
        }

        #[test]
        fn add_assign_accumulates() {
            let mut usage = TokenUsage::default();
            usage += TokenUsage::new(1, 2);
            assert_eq!(usage.total(), 3);
        }
    }

    mod generation_options {
        use super::*;

        #[test]
        fn default_retries_is_two() {
            assert_eq!(GenerationOptions::default().max_retries, 2);
        }

        #[test]
        fn serde_skips_unset_fields() {
            let json = serde_json::to_value(GenerationOptions::default()).unwrap();
            assert!(json.get("temperature").is_none());
            assert!(json.get("stop_sequences").is_none());
            assert_eq!(json["max_retries"], 2);
        }
    }

    mod middleware {
        use super::*;
        use crate::model::mock::MockModel;

        struct Renamer(&'static str);

        struct Renamed {
            id: String,
            inner: Arc<dyn ModelClient>,
        }

        #[async_trait]
        impl ModelClient for Renamed {
            fn model_id(&self) -> &str {
                &self.id
            }

            async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
                self.inner.stream(request).await
            }
        }

        impl ModelMiddleware for Renamer {
            fn wrap(&self, inner: Arc<dyn ModelClient>) -> Arc<dyn ModelClient> {
                Arc::new(Renamed {
                    id: format!("{}/{}", self.0, inner.model_id()),
                    inner,
                })
            }
        }

        #[test]
        fn first_middleware_is_outermost() {
            let base: Arc<dyn ModelClient> = Arc::new(MockModel::from_text("hi"));
            let layers: Vec<Arc<dyn ModelMiddleware>> =
                vec![Arc::new(Renamer("outer")), Arc::new(Renamer("inner"))];
            let wrapped = apply_middleware(base, &layers);
            assert_eq!(wrapped.model_id(), "outer/inner/mock-model");
        }
    }

    mod generate {
        use super::*;
        use crate::model::mock::MockModel;

        #[tokio::test]
        async fn collects_text_and_tool_calls() {
            let model = MockModel::new(vec![vec![
                ModelChunk::text("hel"),
                ModelChunk::text("lo"),
                ModelChunk::tool_call("c1", "ls", json!({})),
                ModelChunk::finish(Some(TokenUsage::new(10, 3))),
            ]
            .into()]);

            let out = generate_text(&model, ModelRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap();
            assert_eq!(out.text, "hello");
            assert_eq!(out.tool_calls.len(), 1);
            assert_eq!(out.usage, Some(TokenUsage::new(10, 3)));
        }
    }
}
