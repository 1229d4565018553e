//! Flatten inbound requests into the single prompt string the chat backend accepts.

use super::openai_types::ChatMessage;

const HUMAN_MARKER: &str = "\n\nHuman: ";
const ASSISTANT_MARKER: &str = "\n\nAssistant:";

/// Separator between rendered chat messages.
const MESSAGE_SEPARATOR: &str = "\n\n";

/// Role shown for messages that carry no role.
const UNKNOWN_ROLE: &str = "Unknown";

/// Strip the Text Completions turn markers from a raw prompt.
///
/// The first `"\n\nHuman: "` is removed, then the first `"\n\nAssistant:"`.
/// Each is removed at most once, wherever it occurs. Prompts without the
/// markers pass through untouched.
pub fn normalize_completion(prompt: &str) -> String {
    prompt
        .replacen(HUMAN_MARKER, "", 1)
        .replacen(ASSISTANT_MARKER, "", 1)
}

/// Render chat messages as `role: content` blocks separated by a blank line.
pub fn normalize_chat(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join(MESSAGE_SEPARATOR)
}

fn render_message(msg: &ChatMessage) -> String {
    let role = msg
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(UNKNOWN_ROLE);
    let content = msg.content.as_deref().unwrap_or_default();
    format!("{role}: {content}")
}
