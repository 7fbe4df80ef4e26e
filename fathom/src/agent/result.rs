//! Run result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::state::StateSnapshot;

/// Final result of a run, distilled from the terminal `done` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Final assistant text.
    pub text: String,
    /// The full message history of the run.
    pub messages: Vec<Message>,
    /// State snapshot at run end.
    pub state: StateSnapshot,
    /// Parsed structured output, when a schema was configured.
    pub output: Option<Value>,
    /// Number of steps taken in this run.
    pub steps: usize,
}

impl RunOutcome {
    /// Parse the structured output as a typed value.
    pub fn output_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        self.output
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_as_deserializes() {
        #[derive(Deserialize)]
        struct Answer {
            value: i64,
        }

        let outcome = RunOutcome {
            output: Some(json!({"value": 42})),
            ..RunOutcome::default()
        };
        let answer: Answer = outcome.output_as().unwrap();
        assert_eq!(answer.value, 42);
    }

    #[test]
    fn output_as_none_when_absent() {
        let outcome = RunOutcome::default();
        assert!(outcome.output_as::<Value>().is_none());
    }
}
