//! Tool for fetching a URL and extracting its text content.
//!
//! Not part of the default registry; add it with the builder's
//! `tool()` when the agent should browse.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::event::AgentEvent;
use crate::tool::{Tool, ToolContext};

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Arguments for [`FetchUrlTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FetchUrlArgs {
    /// The URL to fetch.
    pub url: String,
}

/// Fetch a URL and return its content as plain text.
#[derive(Debug, Clone)]
pub struct FetchUrlTool {
    /// Maximum output length in characters.
    pub max_output_length: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self {
            max_output_length: 40_000,
            timeout_secs: 20,
        }
    }
}

impl FetchUrlTool {
    /// Create a fetch tool with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum output length.
    #[must_use]
    pub const fn with_max_output_length(mut self, max: usize) -> Self {
        self.max_output_length = max;
        self
    }

    fn extract_text(&self, body: &str) -> String {
        let text = SCRIPT_RE.replace_all(body, "");
        let text = STYLE_RE.replace_all(&text, "");
        let text = TAG_RE.replace_all(&text, " ");
        let text = BLANK_RE.replace_all(&text, "\n\n");

        let mut cleaned: String = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if cleaned.len() > self.max_output_length {
            let mut cut = self.max_output_length;
            while cut > 0 && !cleaned.is_char_boundary(cut) {
                cut -= 1;
            }
            cleaned.truncate(cut);
            cleaned.push_str("\n[content truncated]");
        }
        cleaned
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    const NAME: &'static str = "fetch_url";
    type Args = FetchUrlArgs;
    type Output = String;

    fn description(&self) -> String {
        "Fetch a webpage and return its visible text content.".to_owned()
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError> {
        ctx.events().push(AgentEvent::FetchUrlStart {
            url: args.url.clone(),
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|err| ToolError::execution(err.to_string()))?;

        ctx.events().push(AgentEvent::HttpRequestStart {
            method: "GET".to_owned(),
            url: args.url.clone(),
        });

        let request = client.get(&args.url).send();
        let response = tokio::select! {
            response = request => {
                response.map_err(|err| ToolError::execution(format!("fetch failed: {err}")))?
            }
            () = ctx.cancel().cancelled() => {
                return Err(ToolError::execution("fetch cancelled"));
            }
        };

        let status = response.status().as_u16();
        ctx.events().push(AgentEvent::HttpRequestFinish {
            url: args.url.clone(),
            status,
        });

        let body = response
            .text()
            .await
            .map_err(|err| ToolError::execution(format!("fetch body failed: {err}")))?;
        let text = self.extract_text(&body);

        ctx.events().push(AgentEvent::FetchUrlFinish {
            url: args.url.clone(),
            bytes: text.len(),
        });

        if status >= 400 {
            return Ok(format!("HTTP {status} from {}\n{text}", args.url));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let tool = FetchUrlTool::new();
        let html = "<html><head><style>.x{}</style><script>var x=1;</script></head>\
                    <body><h1>Title</h1><p>Hello <b>world</b></p></body></html>";
        let text = tool.extract_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn truncates_long_content() {
        let tool = FetchUrlTool::new().with_max_output_length(10);
        let text = tool.extract_text(&"word ".repeat(100));
        assert!(text.ends_with("[content truncated]"));
    }

    #[test]
    fn default_limits_match_contract() {
        let tool = FetchUrlTool::default();
        assert_eq!(tool.max_output_length, 40_000);
        assert_eq!(tool.timeout_secs, 20);
    }
}
