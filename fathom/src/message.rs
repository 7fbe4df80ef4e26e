//! Message types for agent-model communication, plus history repair.
//!
//! The message sequence is append-only within a run. The patcher
//! repairs dangling tool calls by inserting synthetic tool results so
//! that every assistant tool-call id is answered before the next
//! assistant turn — the invariant both the model and the checkpoint
//! store rely on.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Synthetic tool-result content inserted for a dangling tool call.
pub const CANCELLED_RESULT: &str = "[cancelled]";

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool result message.
    Tool,
}

impl Role {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id pairing this request with its tool result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON value.
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Create a new tool call request.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A chat message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender.
    pub role: Role,
    /// Text content; may be empty for tool-call-only assistant turns.
    #[serde(default)]
    pub content: String,
    /// Tool calls made by the model (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Id of the tool call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Provider-specific metadata (e.g. prompt-caching markers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<Value>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            provider_options: None,
        }
    }

    /// Create a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create a new assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            provider_options: None,
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            provider_options: None,
        }
    }

    /// Attach provider-specific metadata.
    #[must_use]
    pub fn with_provider_options(mut self, options: Value) -> Self {
        self.provider_options = Some(options);
        self
    }

    /// Check if this message carries tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Insert a synthetic `"[cancelled]"` tool result for every assistant
/// tool-call id that is not answered before the next assistant turn.
///
/// The synthetic results are placed immediately after the existing
/// results of the same assistant turn, preserving relative order.
pub fn patch_dangling_tool_calls(messages: &mut Vec<Message>) {
    // (insertion index, tool call id) pairs, collected front to back.
    let mut insertions: Vec<(usize, String)> = Vec::new();

    let mut index = 0;
    while index < messages.len() {
        if messages[index].role != Role::Assistant || !messages[index].has_tool_calls() {
            index += 1;
            continue;
        }

        let expected: Vec<String> = messages[index]
            .tool_calls
            .iter()
            .map(|call| call.id.clone())
            .collect();

        // Scan forward to the next assistant turn, collecting answers.
        let mut answered: HashSet<String> = HashSet::new();
        let mut end = index + 1;
        while end < messages.len() && messages[end].role != Role::Assistant {
            if let Some(id) = &messages[end].tool_call_id {
                answered.insert(id.clone());
            }
            end += 1;
        }

        for id in expected {
            if !answered.contains(&id) {
                insertions.push((end, id));
            }
        }
        index = end;
    }

    // Apply back to front so earlier indices stay valid.
    for (at, id) in insertions.into_iter().rev() {
        messages.insert(at, Message::tool(id, CANCELLED_RESULT));
    }
}

/// Check the tool-call pairing invariant: every assistant tool-call id
/// has exactly one following tool result with the same id before the
/// next assistant turn.
#[must_use]
pub fn tool_pairing_intact(messages: &[Message]) -> bool {
    let mut index = 0;
    while index < messages.len() {
        if messages[index].role != Role::Assistant || !messages[index].has_tool_calls() {
            index += 1;
            continue;
        }

        let expected: Vec<&str> = messages[index]
            .tool_calls
            .iter()
            .map(|call| call.id.as_str())
            .collect();

        let mut answers: Vec<&str> = Vec::new();
        let mut end = index + 1;
        while end < messages.len() && messages[end].role != Role::Assistant {
            if let Some(id) = &messages[end].tool_call_id {
                answers.push(id.as_str());
            }
            end += 1;
        }

        for id in expected {
            if answers.iter().filter(|answer| **answer == id).count() != 1 {
                return false;
            }
        }
        index = end;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "some_tool", json!({}))
    }

    mod construction {
        use super::*;

        #[test]
        fn constructors_set_roles() {
            assert_eq!(Message::system("s").role, Role::System);
            assert_eq!(Message::user("u").role, Role::User);
            assert_eq!(Message::assistant("a").role, Role::Assistant);
            assert_eq!(Message::tool("id", "r").role, Role::Tool);
        }

        #[test]
        fn tool_message_carries_call_id() {
            let msg = Message::tool("call_1", "done");
            assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        }

        #[test]
        fn serde_skips_empty_fields() {
            let json = serde_json::to_value(Message::user("hi")).unwrap();
            assert!(json.get("tool_calls").is_none());
            assert!(json.get("tool_call_id").is_none());
        }

        #[test]
        fn provider_options_round_trip() {
            let msg = Message::system("s")
                .with_provider_options(json!({"cache_control": {"type": "ephemeral"}}));
            let parsed: Message =
                serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
            assert_eq!(parsed.provider_options, msg.provider_options);
        }
    }

    mod patching {
        use super::*;

        #[test]
        fn complete_history_is_untouched() {
            let mut messages = vec![
                Message::user("hi"),
                Message::assistant_with_tool_calls("", vec![call("a")]),
                Message::tool("a", "ok"),
                Message::assistant("done"),
            ];
            let before = messages.clone();
            patch_dangling_tool_calls(&mut messages);
            assert_eq!(messages, before);
            assert!(tool_pairing_intact(&messages));
        }

        #[test]
        fn dangling_call_gets_cancelled_result() {
            let mut messages = vec![
                Message::user("hi"),
                Message::assistant_with_tool_calls("", vec![call("a")]),
            ];
            patch_dangling_tool_calls(&mut messages);
            assert_eq!(messages.len(), 3);
            assert_eq!(messages[2].role, Role::Tool);
            assert_eq!(messages[2].tool_call_id.as_deref(), Some("a"));
            assert_eq!(messages[2].content, CANCELLED_RESULT);
            assert!(tool_pairing_intact(&messages));
        }

        #[test]
        fn partial_answers_are_completed_in_place() {
            let mut messages = vec![
                Message::assistant_with_tool_calls("", vec![call("a"), call("b"), call("c")]),
                Message::tool("b", "ok"),
                Message::assistant("next"),
            ];
            patch_dangling_tool_calls(&mut messages);
            // Synthetic results land before the next assistant turn.
            assert!(tool_pairing_intact(&messages));
            assert_eq!(messages[3].role, Role::Tool);
            assert_eq!(messages.last().unwrap().role, Role::Assistant);
        }

        #[test]
        fn multiple_assistant_turns_patched_independently() {
            let mut messages = vec![
                Message::assistant_with_tool_calls("", vec![call("a")]),
                Message::assistant_with_tool_calls("", vec![call("b")]),
            ];
            patch_dangling_tool_calls(&mut messages);
            assert_eq!(messages.len(), 4);
            assert_eq!(messages[1].tool_call_id.as_deref(), Some("a"));
            assert_eq!(messages[3].tool_call_id.as_deref(), Some("b"));
            assert!(tool_pairing_intact(&messages));
        }

        #[test]
        fn pairing_check_rejects_duplicates() {
            let messages = vec![
                Message::assistant_with_tool_calls("", vec![call("a")]),
                Message::tool("a", "one"),
                Message::tool("a", "two"),
            ];
            assert!(!tool_pairing_intact(&messages));
        }
    }
}
