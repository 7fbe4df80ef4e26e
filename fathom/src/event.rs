//! Streaming events and the per-invocation event queue.
//!
//! Every run produces a single ordered sequence of [`AgentEvent`]s.
//! The engine emits lifecycle events directly; tools enqueue semantic
//! events through the [`EventQueue`] handle in their context, and the
//! engine drains the queue around each tool execution so that a tool's
//! events always precede its `tool-result`. Each event carries enough
//! data to reconstruct a UI timeline without inspecting state.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, ToolCallRequest};
use crate::state::{StateSnapshot, TodoItem};

/// Boxed stream of agent events.
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// An entry returned by `ls` / `glob` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path of the entry.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// A single grep hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrepHit {
    /// File containing the match.
    pub path: String,
    /// 1-based line number.
    pub line_number: usize,
    /// The matching line.
    pub line: String,
}

/// Events emitted during a run, in stream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum AgentEvent {
    /// Incremental text from the model.
    Text {
        /// The text fragment.
        text: String,
    },
    /// A completed block of assistant text within a step.
    TextSegment {
        /// The full segment.
        text: String,
    },
    /// A step is starting.
    StepStart {
        /// 1-based step number, cumulative across resumes.
        step: usize,
    },
    /// A step has finished.
    StepFinish {
        /// The step number.
        step: usize,
        /// Tool calls made during the step.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// The model requested a tool call.
    ToolCall {
        /// Tool name.
        name: String,
        /// Tool call id.
        id: String,
        /// Arguments as JSON.
        args: Value,
    },
    /// A tool call completed.
    ToolResult {
        /// Tool name.
        name: String,
        /// Tool call id.
        id: String,
        /// Result payload (possibly an eviction descriptor).
        result: Value,
        /// Whether the result is an error.
        is_error: bool,
    },
    /// The todo list changed.
    TodosChanged {
        /// The new todo list.
        todos: Vec<TodoItem>,
    },
    /// A file write is starting.
    FileWriteStart {
        /// Target path.
        path: String,
    },
    /// A file was written.
    FileWritten {
        /// Target path.
        path: String,
        /// Number of lines written.
        lines: usize,
    },
    /// A file was edited.
    FileEdited {
        /// Target path.
        path: String,
        /// Number of replacements applied.
        replacements: usize,
    },
    /// A file was read.
    FileRead {
        /// Source path.
        path: String,
    },
    /// A directory listing was produced.
    Ls {
        /// Listed path.
        path: String,
        /// Entries found.
        entries: Vec<FileEntry>,
    },
    /// A glob pattern was evaluated.
    Glob {
        /// The pattern.
        pattern: String,
        /// Matching entries.
        matches: Vec<FileEntry>,
    },
    /// A grep search was executed.
    Grep {
        /// The pattern.
        pattern: String,
        /// Matching lines.
        matches: Vec<GrepHit>,
    },
    /// A sandbox command is starting.
    ExecuteStart {
        /// The command line.
        command: String,
    },
    /// A sandbox command finished.
    ExecuteFinish {
        /// Process exit code.
        exit_code: i32,
        /// Whether output was truncated at the size cap.
        truncated: bool,
    },
    /// A web search is starting.
    WebSearchStart {
        /// The query.
        query: String,
    },
    /// A web search finished.
    WebSearchFinish {
        /// The query.
        query: String,
        /// Number of results.
        results: usize,
    },
    /// An HTTP request is starting.
    HttpRequestStart {
        /// Request method.
        method: String,
        /// Request URL.
        url: String,
    },
    /// An HTTP request finished.
    HttpRequestFinish {
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
    },
    /// A URL fetch is starting.
    FetchUrlStart {
        /// The URL.
        url: String,
    },
    /// A URL fetch finished.
    FetchUrlFinish {
        /// The URL.
        url: String,
        /// Bytes of extracted text.
        bytes: usize,
    },
    /// A sub-agent run is starting.
    SubagentStart {
        /// Name of the sub-agent.
        agent_name: String,
        /// The delegated task.
        task: String,
    },
    /// A sub-agent run finished.
    SubagentFinish {
        /// Name of the sub-agent.
        agent_name: String,
        /// Whether the sub-agent failed.
        is_error: bool,
    },
    /// A user message was appended to the conversation.
    UserMessage {
        /// The message content.
        content: String,
    },
    /// A tool call is paused awaiting approval.
    ApprovalRequested {
        /// Fresh approval id.
        approval_id: String,
        /// The paused tool call id.
        tool_call_id: String,
        /// The paused tool name.
        tool_name: String,
        /// The call arguments.
        args: Value,
    },
    /// An approval decision was recorded.
    ApprovalResponse {
        /// The approval id.
        approval_id: String,
        /// Whether the call was approved.
        approved: bool,
    },
    /// A checkpoint was durably saved.
    CheckpointSaved {
        /// Thread id of the checkpoint.
        thread_id: String,
        /// Cumulative step number saved.
        step: usize,
    },
    /// A checkpoint was loaded for resumption.
    CheckpointLoaded {
        /// Thread id of the checkpoint.
        thread_id: String,
        /// Step number at which the checkpoint was taken.
        step: usize,
    },
    /// Terminal success event.
    Done {
        /// Final state snapshot.
        state: StateSnapshot,
        /// Final assistant text, if any.
        text: Option<String>,
        /// The full message history.
        messages: Vec<Message>,
        /// Parsed structured output, present iff a schema was
        /// configured and validation succeeded.
        output: Option<Value>,
    },
    /// Terminal failure event.
    Error {
        /// Stable error kind discriminant.
        kind: String,
        /// Human-readable description.
        error: String,
    },
}

impl AgentEvent {
    /// Whether this event terminates the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Build an error event from a crate error.
    #[must_use]
    pub fn from_error(error: &crate::error::Error) -> Self {
        Self::Error {
            kind: error.kind().to_owned(),
            error: error.to_string(),
        }
    }
}

/// Single-producer-set / single-consumer FIFO for tool-emitted events.
///
/// Cloning shares the underlying buffer; the engine owns the only
/// consumer. Because tool executions are serialized by the engine, at
/// most one producer is active per tick.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<AgentEvent>>>,
}

impl EventQueue {
    /// Create a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event.
    pub fn push(&self, event: AgentEvent) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    /// Drain all pending events in FIFO order.
    #[must_use]
    pub fn drain(&self) -> Vec<AgentEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}
