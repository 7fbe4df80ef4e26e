//! Human-in-the-loop approval for tool execution.
//!
//! Each tool name may carry an [`InterruptPolicy`]. Before a gated
//! call runs, the engine emits `approval-requested`, awaits the
//! caller's [`ApprovalHandler`], and either executes the tool or
//! answers the call with [`DENIED_RESULT`]. A denial is recorded as a
//! [`PendingInterrupt`] on that step's checkpoint so a later run can
//! resume with an explicit decision.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool-result content used when a call is denied.
pub const DENIED_RESULT: &str = "[denied by user]";

/// Per-tool approval policy.
#[derive(Clone, Default)]
pub enum InterruptPolicy {
    /// Always pause for approval.
    Always,
    /// Run immediately.
    #[default]
    Never,
    /// Pause iff the predicate matches the call arguments.
    When(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl InterruptPolicy {
    /// Policy that pauses when the predicate returns true.
    #[must_use]
    pub fn when(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::When(Arc::new(predicate))
    }

    /// Whether a call with these arguments requires approval.
    #[must_use]
    pub fn requires_approval(&self, arguments: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::When(predicate) => predicate(arguments),
        }
    }
}

impl fmt::Debug for InterruptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("InterruptPolicy::Always"),
            Self::Never => f.write_str("InterruptPolicy::Never"),
            Self::When(_) => f.write_str("InterruptPolicy::When(..)"),
        }
    }
}

/// A request for approval of one paused tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Fresh id identifying this request.
    pub approval_id: String,
    /// The paused tool call id.
    pub tool_call_id: String,
    /// The paused tool name.
    pub tool_name: String,
    /// The call arguments.
    pub arguments: Value,
}

/// Decision on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Execute the call.
    Approve,
    /// Refuse the call.
    Deny,
}

impl ApprovalDecision {
    /// Whether the decision approves execution.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// Awaitable approval callback supplied per run.
///
/// When a gated call has no handler, the engine auto-denies.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Decide on one approval request.
    async fn on_approval_request(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Handler that approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAllHandler;

#[async_trait]
impl ApprovalHandler for ApproveAllHandler {
    async fn on_approval_request(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}

/// Handler that denies every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllHandler;

#[async_trait]
impl ApprovalHandler for DenyAllHandler {
    async fn on_approval_request(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Deny
    }
}

/// A denied approval recorded on a checkpoint, awaiting resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// The approval id the resume decision must match.
    pub approval_id: String,
    /// The paused tool call id.
    pub tool_call_id: String,
    /// The paused tool name.
    pub tool_name: String,
    /// The call arguments, replayed on resume-approve.
    pub arguments: Value,
}

impl From<&ApprovalRequest> for PendingInterrupt {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            approval_id: request.approval_id.clone(),
            tool_call_id: request.tool_call_id.clone(),
            tool_name: request.tool_name.clone(),
            arguments: request.arguments.clone(),
        }
    }
}

/// A decision carried by a resume call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDecision {
    /// The approval id this decision answers.
    pub approval_id: String,
    /// The decision.
    pub decision: ApprovalDecision,
}

impl ResumeDecision {
    /// An approve decision for the given approval id.
    #[must_use]
    pub fn approve(approval_id: impl Into<String>) -> Self {
        Self {
            approval_id: approval_id.into(),
            decision: ApprovalDecision::Approve,
        }
    }

    /// A deny decision for the given approval id.
    #[must_use]
    pub fn deny(approval_id: impl Into<String>) -> Self {
        Self {
            approval_id: approval_id.into(),
            decision: ApprovalDecision::Deny,
        }
    }
}
