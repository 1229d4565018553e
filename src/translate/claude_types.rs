//! Type definitions for the legacy Anthropic Text Completions API (`/v1/complete`).

use serde::{Deserialize, Serialize};

/// Model reported on streamed completion events.
pub const STREAM_MODEL: &str = "claude-2.0";

/// Model reported on whole (non-streamed) completions.
pub const COMPLETE_MODEL: &str = "claude-2";

/// SSE event name carrying a completion fragment.
pub const COMPLETION_EVENT: &str = "completion";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Raw prompt, usually wrapped in `\n\nHuman: ... \n\nAssistant:` markers.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl CompletionRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Shared by the whole response and each streamed `completion` event.
/// `stop_reason` is always serialized, as `null` on stream events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub completion: String,
    pub stop_reason: Option<String>,
    pub model: String,
}

/// Body of `/claude/reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub claude: String,
}
