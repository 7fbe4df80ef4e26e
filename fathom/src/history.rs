//! Input resolution: merging explicit messages, prompt, and
//! checkpoint history into the run's message sequence.
//!
//! Priority rules:
//! - explicit `messages` are appended to the checkpoint history; an
//!   empty array discards the history (the documented reset), and a
//!   reset with nothing else to do is a no-op run;
//! - a bare `prompt` becomes a user message appended to the history;
//! - with neither, the checkpoint history is used as-is (resume).

use tracing::warn;

use crate::message::{Message, Role};

/// Outcome of input resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolvedInput {
    /// Nothing to run: emit an empty `done` immediately.
    NoOp,
    /// Run with this message sequence.
    Run {
        /// The resolved conversation, checkpoint history first.
        messages: Vec<Message>,
        /// Content of user messages appended by this resolution, in
        /// order; each is surfaced as a `user-message` event.
        appended_user: Vec<String>,
    },
}

/// Resolve the run input from the caller's options and the loaded
/// checkpoint history.
pub(crate) fn resolve_messages(
    prompt: Option<String>,
    messages: Option<Vec<Message>>,
    history: Vec<Message>,
    has_resume_target: bool,
) -> ResolvedInput {
    match messages {
        Some(explicit) => {
            if prompt.is_some() && cfg!(debug_assertions) {
                warn!("both `messages` and `prompt` supplied; `prompt` is ignored");
            }
            if explicit.is_empty() {
                // Reset history. With nothing else to drive the run,
                // this is the documented no-op.
                if has_resume_target {
                    ResolvedInput::Run {
                        messages: Vec::new(),
                        appended_user: Vec::new(),
                    }
                } else {
                    ResolvedInput::NoOp
                }
            } else {
                let appended_user = explicit
                    .iter()
                    .filter(|message| message.role == Role::User)
                    .map(|message| message.content.clone())
                    .collect();
                let mut merged = history;
                merged.extend(explicit);
                ResolvedInput::Run {
                    messages: merged,
                    appended_user,
                }
            }
        }
        None => match prompt {
            Some(prompt) => {
                let mut merged = history;
                merged.push(Message::user(prompt.clone()));
                ResolvedInput::Run {
                    messages: merged,
                    appended_user: vec![prompt],
                }
            }
            None => ResolvedInput::Run {
                messages: history,
                appended_user: Vec::new(),
            },
        },
    }
}

/// Whether the sequence contains any user content to work from.
pub(crate) fn has_user_content(messages: &[Message]) -> bool {
    messages.iter().any(|message| {
        message.role == Role::User || (message.role == Role::Assistant && message.has_tool_calls())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_appends_to_history() {
        let history = vec![Message::user("earlier")];
        let resolved = resolve_messages(Some("now".to_owned()), None, history, false);
        let ResolvedInput::Run {
            messages,
            appended_user,
        } = resolved
        else {
            panic!("expected run");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "now");
        assert_eq!(appended_user, vec!["now"]);
    }

    #[test]
    fn explicit_messages_append_to_history() {
        let history = vec![Message::user("earlier")];
        let explicit = vec![Message::user("explicit")];
        let resolved = resolve_messages(None, Some(explicit), history, false);
        let ResolvedInput::Run { messages, .. } = resolved else {
            panic!("expected run");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "explicit");
    }

    #[test]
    fn explicit_messages_win_over_prompt() {
        let resolved = resolve_messages(
            Some("ignored".to_owned()),
            Some(vec![Message::user("kept")]),
            Vec::new(),
            false,
        );
        let ResolvedInput::Run { messages, .. } = resolved else {
            panic!("expected run");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }

    #[test]
    fn empty_messages_without_resume_is_noop() {
        let history = vec![Message::user("earlier")];
        let resolved = resolve_messages(None, Some(Vec::new()), history, false);
        assert_eq!(resolved, ResolvedInput::NoOp);
    }

    #[test]
    fn empty_messages_with_resume_resets_history() {
        let history = vec![Message::user("earlier")];
        let resolved = resolve_messages(None, Some(Vec::new()), history, true);
        let ResolvedInput::Run { messages, .. } = resolved else {
            panic!("expected run");
        };
        assert!(messages.is_empty());
    }

    #[test]
    fn bare_history_passes_through() {
        let history = vec![Message::user("earlier"), Message::assistant("partial")];
        let resolved = resolve_messages(None, None, history.clone(), true);
        let ResolvedInput::Run {
            messages,
            appended_user,
        } = resolved
        else {
            panic!("expected run");
        };
        assert_eq!(messages, history);
        assert!(appended_user.is_empty());
    }

    #[test]
    fn user_content_detection() {
        assert!(has_user_content(&[Message::user("x")]));
        assert!(!has_user_content(&[Message::assistant("x")]));
        assert!(!has_user_content(&[]));
    }
}
