use super::claude_types::{Completion, ResetResponse, COMPLETE_MODEL};
use super::openai_types::{ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage};

/// Identity stamped on every whole chat completion.
pub const RESPONSE_ID: &str = "chatcmpl-88UsRDsT3GHYNwHqEKsrOA4rYaY2D";
pub const RESPONSE_CREATED: u64 = 1_697_036_007;
pub const RESPONSE_MODEL: &str = "gpt-35-turbo";

/// The backend reports no token counts, so these are fixed placeholders and
/// do not reflect the prompt or reply.
pub const PLACEHOLDER_USAGE: ChatUsage = ChatUsage {
    prompt_tokens: 238,
    completion_tokens: 187,
    total_tokens: 425,
};

/// Wrap a full backend reply as a Text Completions response.
pub fn completion_response(reply: impl Into<String>) -> Completion {
    Completion {
        completion: reply.into(),
        stop_reason: Some("stop_sequence".to_string()),
        model: COMPLETE_MODEL.to_string(),
    }
}

/// Wrap a full backend reply as a Chat Completions response.
pub fn chat_completion_response(reply: impl Into<String>) -> ChatCompletionResponse {
    ChatCompletionResponse {
        model: RESPONSE_MODEL.to_string(),
        object: "chat.completion".to_string(),
        usage: PLACEHOLDER_USAGE,
        id: RESPONSE_ID.to_string(),
        created: RESPONSE_CREATED,
        choices: vec![Choice {
            index: 0,
            delta: None,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: reply.into(),
            },
            finish_reason: Some("stop".to_string()),
        }],
    }
}

pub fn reset_response(reply: impl Into<String>) -> ResetResponse {
    ResetResponse {
        claude: reply.into(),
    }
}
