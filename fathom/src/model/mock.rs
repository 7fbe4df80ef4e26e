//! Mock model implementation for testing.
//!
//! Returns scripted chunk sequences in order, cycling when exhausted,
//! so engine behavior can be exercised without a real provider.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use super::{ModelChunk, ModelClient, ModelRequest, ModelStream, TokenUsage};
use crate::error::ModelError;

/// One scripted model turn: either a chunk sequence or a failure.
#[derive(Debug, Clone)]
pub struct MockTurn {
    /// Chunks yielded by this turn, in order.
    pub chunks: Vec<ModelChunk>,
    /// When set, the turn fails with this error instead of streaming.
    pub fail: Option<ModelError>,
}

impl From<Vec<ModelChunk>> for MockTurn {
    fn from(chunks: Vec<ModelChunk>) -> Self {
        Self { chunks, fail: None }
    }
}

impl MockTurn {
    /// A turn that fails before yielding any chunk.
    #[must_use]
    pub const fn failure(error: ModelError) -> Self {
        Self {
            chunks: Vec::new(),
            fail: Some(error),
        }
    }

    /// A plain text turn ending with a finish chunk.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::from(vec![
            ModelChunk::text(text),
            ModelChunk::finish(Some(TokenUsage::new(10, 10))),
        ])
    }

    /// A turn requesting a single tool call.
    #[must_use]
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::from(vec![
            ModelChunk::tool_call(id, name, arguments),
            ModelChunk::finish(Some(TokenUsage::new(10, 5))),
        ])
    }
}

/// A scripted mock model for tests.
///
/// Each call to [`ModelClient::stream`] plays the next scripted turn,
/// cycling back to the first when the script runs out.
///
/// # Example
///
/// ```rust,ignore
/// let model = MockModel::new(vec![
///     MockTurn::tool_call("c1", "write_todos", json!({"todos": []})),
///     MockTurn::text("All done."),
/// ]);
/// ```
#[derive(Debug)]
pub struct MockModel {
    model_id: String,
    turns: Vec<MockTurn>,
    cursor: AtomicUsize,
}

impl MockModel {
    /// Create a mock model from scripted turns.
    #[must_use]
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            model_id: "mock-model".to_owned(),
            turns,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A model that answers every call with the same text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockTurn::text(text)])
    }

    /// Override the reported model id.
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// How many times the model has been called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, _request: ModelRequest) -> Result<ModelStream, ModelError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let turn = if self.turns.is_empty() {
            MockTurn::text("")
        } else {
            self.turns[index % self.turns.len()].clone()
        };

        if let Some(error) = turn.fail {
            return Err(error);
        }

        let items: Vec<Result<ModelChunk, ModelError>> =
            turn.chunks.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::model::generate_text;
    use serde_json::json;

    #[tokio::test]
    async fn plays_turns_in_order_and_cycles() {
        let model = MockModel::new(vec![MockTurn::text("first"), MockTurn::text("second")]);
        let request = || ModelRequest::new(vec![Message::user("hi")]);

        let first = generate_text(&model, request()).await.unwrap();
        assert_eq!(first.text, "first");
        let second = generate_text(&model, request()).await.unwrap();
        assert_eq!(second.text, "second");
        let third = generate_text(&model, request()).await.unwrap();
        assert_eq!(third.text, "first");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn failure_turn_errors() {
        let model = MockModel::new(vec![
            MockTurn::failure(ModelError::call("boom")),
            MockTurn::text("recovered"),
        ]);
        let request = || ModelRequest::new(vec![Message::user("hi")]);

        assert!(generate_text(&model, request()).await.is_err());
        let second = generate_text(&model, request()).await.unwrap();
        assert_eq!(second.text, "recovered");
    }

    #[tokio::test]
    async fn tool_call_turn_yields_call() {
        let model = MockModel::new(vec![MockTurn::tool_call("c1", "ls", json!({"path": "/"}))]);
        let out = generate_text(&model, ModelRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "ls");
    }

    #[test]
    fn custom_model_id() {
        let model = MockModel::from_text("x").with_model_id("custom");
        assert_eq!(model.model_id(), "custom");
    }
}
