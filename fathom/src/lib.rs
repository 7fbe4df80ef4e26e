//! Fathom is a Rust library for building deep agents: long-running
//! LLM-driven workers that plan with a todo list, read and mutate a
//! virtual filesystem, delegate to sub-agents, optionally execute
//! shell commands in a sandbox, and expose a streaming event interface
//! with checkpointed resumption.
//!
//! The core is the execution engine behind [`agent::DeepAgent`]: a
//! model/tool loop that multiplexes model output with tool-emitted
//! events, persists per-step checkpoints, pauses for human approval
//! where configured, and manages the context window through
//! summarization and tool-result eviction.

// Core plumbing
pub mod cancel;
pub mod error;
pub mod event;
pub mod message;
pub mod state;

// Model adapters
pub mod model;

// Tools and approval
pub mod approval;
pub mod tool;
pub mod tools;

// Storage and persistence
pub mod backend;
pub mod checkpoint;

// Context-window management
pub mod evict;
pub mod summarize;

// Skills index
pub mod skills;

// The engine
pub mod agent;

mod history;

// Re-export the types most callers need.
pub use agent::{
    AgentBuilder, DeepAgent, LoopControl, OutputSpec, RunOptions, RunOutcome, StepOutcome,
};
pub use approval::{ApprovalDecision, ApprovalHandler, InterruptPolicy, ResumeDecision};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use event::AgentEvent;
pub use message::Message;
pub use model::{ModelClient, ModelRequest};
pub use state::{AgentState, TodoItem, TodoStatus};
pub use tool::{Tool, ToolContext};
pub use tools::SubagentSpec;
