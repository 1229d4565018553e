use crate::backend::{ChatBackend, Conversation, FragmentStream};
use crate::error::{GatewayError, Result};
use crate::logging::RequestLogger;
use crate::translate::streaming::{completion_event, ChatStreamFramer, SseEvent};

use futures::stream::Stream;
use futures::StreamExt;
use std::sync::Arc;

/// One request, one conversation: every [`send`](SessionGateway::send) opens a
/// fresh backend conversation and submits the prompt exactly once.
#[derive(Clone)]
pub struct SessionGateway {
    backend: Arc<dyn ChatBackend>,
}

impl SessionGateway {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn send(&self, prompt: &str) -> Result<PendingReply> {
        let mut conversation = self.backend.open().await.map_err(unavailable)?;
        conversation.send(prompt).await.map_err(unavailable)?;
        Ok(PendingReply { conversation })
    }
}

/// A submitted prompt whose reply can be taken whole or streamed, not both.
pub struct PendingReply {
    conversation: Box<dyn Conversation>,
}

impl PendingReply {
    pub async fn full_reply(mut self) -> Result<String> {
        self.conversation.reply().await.map_err(unavailable)
    }

    pub fn fragments(self) -> FragmentStream {
        self.conversation.fragments()
    }
}

/// Any failure talking to the backend surfaces as `BackendUnavailable`.
fn unavailable(err: GatewayError) -> GatewayError {
    if matches!(err, GatewayError::BackendUnavailable { .. }) {
        err
    } else {
        GatewayError::backend(err.to_string())
    }
}

/// Frame backend fragments as Text Completions `completion` events.
/// A backend failure ends the stream without a closing event.
pub fn completion_sse_stream(
    mut fragments: FragmentStream,
    log: RequestLogger,
) -> impl Stream<Item = SseEvent> + Send + 'static {
    async_stream::stream! {
        let mut count = 0usize;
        let mut failed = false;

        while let Some(item) = fragments.next().await {
            match item.and_then(|fragment| completion_event(&fragment)) {
                Ok(event) => {
                    count += 1;
                    yield event;
                }
                Err(e) => {
                    log.error("stream", format!("Completion stream aborted after {count} fragments: {e}"));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            log.info("stream", format!("Completion stream finished: {count} fragments"));
        }
    }
}

/// Frame backend fragments as Chat Completions data lines, bracketed by the
/// opening role chunk and the closing `stop` chunk plus `[DONE]`.
/// A backend failure ends the stream without the closing lines.
pub fn chat_sse_stream(
    mut fragments: FragmentStream,
    log: RequestLogger,
) -> impl Stream<Item = String> + Send + 'static {
    async_stream::stream! {
        let mut framer = ChatStreamFramer::new();
        let mut count = 0usize;

        match framer.start() {
            Ok(lines) => {
                for line in lines {
                    yield line;
                }
            }
            Err(e) => {
                log.error("stream", format!("Failed to frame opening chunk: {e}"));
                return;
            }
        }

        while let Some(item) = fragments.next().await {
            match item.and_then(|fragment| framer.fragment(&fragment)) {
                Ok(lines) => {
                    count += 1;
                    for line in lines {
                        yield line;
                    }
                }
                Err(e) => {
                    log.error("stream", format!("Chat stream aborted after {count} fragments: {e}"));
                    return;
                }
            }
        }

        match framer.finish() {
            Ok(lines) => {
                for line in lines {
                    yield line;
                }
                log.info("stream", format!("Chat stream finished: {count} fragments"));
            }
            Err(e) => log.error("stream", format!("Failed to frame closing chunk: {e}")),
        }
    }
}
