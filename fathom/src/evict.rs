//! Tool-result eviction: keep the context window small by spilling
//! oversized tool results to the backend.
//!
//! When eviction is enabled and a result's textual encoding exceeds
//! the limit, the full content is written to
//! `/tool-results/<sanitized-id>.txt` and the in-message result is
//! replaced by a short descriptor `{ path, original_size }`. A failed
//! backend write degrades gracefully: the original result stays
//! in-message and a warning is logged.

use serde_json::{Value, json};
use tracing::warn;

use crate::backend::Backend;
use crate::tool::result_content;

/// Directory evicted results are written to.
pub const EVICTION_DIR: &str = "/tool-results";

/// Maximum length of a sanitized id.
const MAX_ID_LEN: usize = 128;

/// Sanitize an id for use as a file name: keep `[A-Za-z0-9._-]`,
/// replace everything else with `_`, clip to 128 characters.
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    let mut sanitized: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    sanitized.truncate(MAX_ID_LEN);
    sanitized
}

/// Path an evicted result for `tool_call_id` is written to.
#[must_use]
pub fn eviction_path(tool_call_id: &str) -> String {
    format!("{EVICTION_DIR}/{}.txt", sanitize_id(tool_call_id))
}

/// Evict `result` if its textual encoding exceeds `limit`.
///
/// Returns the value to place in the tool message: the original
/// result, or a descriptor pointing at the spilled file.
pub async fn maybe_evict(
    result: Value,
    tool_call_id: &str,
    backend: &dyn Backend,
    limit: Option<usize>,
) -> Value {
    let Some(limit) = limit else {
        return result;
    };

    let content = result_content(&result);
    if content.len() <= limit {
        return result;
    }

    let path = eviction_path(tool_call_id);
    match backend.write(&path, &content).await {
        Ok(()) => json!({
            "path": path,
            "original_size": content.len(),
        }),
        Err(err) => {
            warn!(
                tool_call_id,
                error = %err,
                "tool result eviction failed; keeping result in message"
            );
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, FileInfo, GrepMatch, StateBackend};
    use crate::error::BackendError;
    use crate::state::{AgentState, FileData};
    use async_trait::async_trait;

    mod sanitization {
        use super::*;

        #[test]
        fn keeps_safe_characters() {
            assert_eq!(sanitize_id("call_ab-1.2"), "call_ab-1.2");
        }

        #[test]
        fn replaces_unsafe_characters() {
            assert_eq!(sanitize_id("a/b:c d"), "a_b_c_d");
        }

        #[test]
        fn clips_to_128() {
            let long = "x".repeat(300);
            assert_eq!(sanitize_id(&long).len(), 128);
        }
    }

    mod eviction {
        use super::*;
        use serde_json::json;

        fn backend() -> (StateBackend, AgentState) {
            let state = AgentState::new();
            (StateBackend::new(state.clone()), state)
        }

        #[tokio::test]
        async fn small_results_pass_through() {
            let (backend, _) = backend();
            let result = maybe_evict(json!("short"), "c1", &backend, Some(100)).await;
            assert_eq!(result, json!("short"));
        }

        #[tokio::test]
        async fn disabled_limit_never_evicts() {
            let (backend, _) = backend();
            let big = "x".repeat(10_000);
            let result = maybe_evict(json!(big.clone()), "c1", &backend, None).await;
            assert_eq!(result, json!(big));
        }

        #[tokio::test]
        async fn oversized_result_is_spilled_with_descriptor() {
            let (backend, state) = backend();
            let big = "line\n".repeat(100);
            let result = maybe_evict(json!(big.clone()), "call/odd id", &backend, Some(10)).await;

            let path = result["path"].as_str().unwrap();
            assert_eq!(path, "/tool-results/call_odd_id.txt");
            assert_eq!(result["original_size"], big.len());

            // Round trip: the spilled file holds the original content.
            assert_eq!(state.file(path).unwrap().text(), big);
        }

        struct FailingBackend;

        #[async_trait]
        impl Backend for FailingBackend {
            async fn ls_info(&self, _path: &str) -> BackendResult<Vec<FileInfo>> {
                Ok(Vec::new())
            }
            async fn read(
                &self,
                path: &str,
                _offset: usize,
                _limit: usize,
            ) -> BackendResult<String> {
                Err(BackendError::NotFound(path.to_owned()))
            }
            async fn read_raw(&self, path: &str) -> BackendResult<FileData> {
                Err(BackendError::NotFound(path.to_owned()))
            }
            async fn grep_raw(
                &self,
                _pattern: &str,
                _path: Option<&str>,
            ) -> BackendResult<Vec<GrepMatch>> {
                Ok(Vec::new())
            }
            async fn glob_info(&self, _pattern: &str) -> BackendResult<Vec<FileInfo>> {
                Ok(Vec::new())
            }
            async fn write(&self, path: &str, _content: &str) -> BackendResult<()> {
                Err(BackendError::InvalidPath(path.to_owned()))
            }
            async fn edit(
                &self,
                path: &str,
                _old: &str,
                _new: &str,
                _replace_all: bool,
            ) -> BackendResult<usize> {
                Err(BackendError::NotFound(path.to_owned()))
            }
        }

        #[tokio::test]
        async fn failed_write_keeps_original() {
            let big = "x".repeat(1000);
            let result = maybe_evict(json!(big.clone()), "c1", &FailingBackend, Some(10)).await;
            assert_eq!(result, json!(big));
        }
    }
}
