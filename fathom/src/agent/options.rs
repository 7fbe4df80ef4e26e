//! Per-run options.

use std::fmt;
use std::sync::Arc;

use crate::approval::{ApprovalHandler, ResumeDecision};
use crate::cancel::CancelToken;
use crate::message::Message;
use crate::state::AgentState;

/// Options for one run.
///
/// At least one of `prompt`, `messages`, `resume`, or `thread_id` must
/// be present. Bare strings convert into a prompt-only run:
///
/// ```rust,ignore
/// agent.generate("2+2?").await?;
/// ```
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Single prompt, appended to the thread history as a user message.
    pub prompt: Option<String>,
    /// Explicit messages; an empty vec resets the thread history.
    pub messages: Option<Vec<Message>>,
    /// Per-run override of the step budget.
    pub max_steps: Option<usize>,
    /// Caller-owned state to run against (mutated in place).
    pub state: Option<AgentState>,
    /// Abort token for cancellation.
    pub cancel: Option<CancelToken>,
    /// Thread id for checkpointed resumption.
    pub thread_id: Option<String>,
    /// Decisions answering a pending approval interrupt.
    pub resume: Option<Vec<ResumeDecision>>,
    /// Approval callback for gated tools.
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
}

impl RunOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prompt.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set explicit messages.
    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Override the step budget.
    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Run against caller-owned state.
    #[must_use]
    pub fn state(mut self, state: AgentState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach an abort token.
    #[must_use]
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run on a checkpointed thread.
    #[must_use]
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Resume with approval decisions.
    #[must_use]
    pub fn resume(mut self, decisions: Vec<ResumeDecision>) -> Self {
        self.resume = Some(decisions);
        self
    }

    /// Attach the approval handler.
    #[must_use]
    pub fn approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = Some(handler);
        self
    }

    /// Whether any run driver is present.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.prompt.is_some()
            || self.messages.is_some()
            || self.resume.is_some()
            || self.thread_id.is_some()
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("prompt", &self.prompt)
            .field("messages", &self.messages.as_ref().map(Vec::len))
            .field("max_steps", &self.max_steps)
            .field("thread_id", &self.thread_id)
            .field("has_resume", &self.resume.is_some())
            .finish_non_exhaustive()
    }
}

impl From<&str> for RunOptions {
    fn from(prompt: &str) -> Self {
        Self::new().prompt(prompt)
    }
}

impl From<String> for RunOptions {
    fn from(prompt: String) -> Self {
        Self::new().prompt(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_sets_prompt() {
        let options = RunOptions::from("hello");
        assert_eq!(options.prompt.as_deref(), Some("hello"));
        assert!(options.has_input());
    }

    #[test]
    fn empty_options_have_no_input() {
        assert!(!RunOptions::new().has_input());
    }

    #[test]
    fn thread_id_counts_as_input() {
        assert!(RunOptions::new().thread_id("t1").has_input());
    }

    #[test]
    fn builder_chains() {
        let options = RunOptions::new()
            .prompt("p")
            .thread_id("t")
            .max_steps(5);
        assert_eq!(options.max_steps, Some(5));
        assert_eq!(options.thread_id.as_deref(), Some("t"));
    }
}
