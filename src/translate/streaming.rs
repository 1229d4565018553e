//! Framing of backend reply fragments into each vendor's streaming wire format.
//!
//! The Text Completions stream is a sequence of named SSE events
//! ([`completion_event`]). The Chat Completions stream is a sequence of raw
//! `data: <json>\n\n` lines driven by the [`ChatStreamFramer`] state machine,
//! which guarantees the opening role chunk, the closing `stop` chunk, and the
//! `[DONE]` sentinel regardless of how many fragments arrive in between.

use super::claude_types::{Completion, COMPLETION_EVENT, STREAM_MODEL};
use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use crate::error::Result;

/// Identity stamped on every streamed chat chunk.
pub const CHUNK_ID: &str = "chatcmpl-87FpvEcXVGUigZE9y0OoYGqxKHLQT";
pub const CHUNK_CREATED: u64 = 1_696_739_863;
pub const CHUNK_MODEL: &str = "gpt-3.5-turbo-0613";

/// Terminal line of a Chat Completions stream.
pub const DONE_LINE: &str = "data: [DONE]\n\n";

/// A named SSE event; `data` is already serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Frame one fragment as a Text Completions `completion` event.
pub fn completion_event(fragment: &str) -> Result<SseEvent> {
    let payload = Completion {
        completion: fragment.to_string(),
        stop_reason: None,
        model: STREAM_MODEL.to_string(),
    };
    Ok(SseEvent {
        event: COMPLETION_EVENT.to_string(),
        data: serde_json::to_string(&payload)?,
    })
}

/// Which chunk of a Chat Completions stream is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition<'a> {
    Initial,
    Middle(&'a str),
    Final,
}

pub fn chat_chunk(position: ChunkPosition<'_>) -> ChatCompletionChunk {
    let (delta, finish_reason) = match position {
        ChunkPosition::Initial => (
            ChunkDelta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
            },
            None,
        ),
        ChunkPosition::Middle(fragment) => (
            ChunkDelta {
                role: None,
                content: Some(fragment.to_string()),
            },
            None,
        ),
        ChunkPosition::Final => (ChunkDelta::default(), Some("stop".to_string())),
    };

    ChatCompletionChunk {
        id: CHUNK_ID.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: CHUNK_CREATED,
        model: CHUNK_MODEL.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// Serialize a chunk as a raw SSE data line.
pub fn data_line(chunk: &ChatCompletionChunk) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Start,
    InitialSent,
    EmittingFragment,
    DoneSent,
}

/// Produces the Chat Completions line sequence
/// `initial, fragment*, final, [DONE]` with no backward transitions.
///
/// Usage:
///   let mut framer = ChatStreamFramer::new();
///   send(framer.start()?);
///   for fragment in fragments {
///       send(framer.fragment(&fragment)?);
///   }
///   send(framer.finish()?);
#[derive(Debug)]
pub struct ChatStreamFramer {
    state: StreamState,
}

impl Default for ChatStreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamFramer {
    pub fn new() -> Self {
        Self {
            state: StreamState::Start,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Emit the opening role chunk. No-op once started.
    pub fn start(&mut self) -> Result<Vec<String>> {
        if self.state != StreamState::Start {
            return Ok(Vec::new());
        }
        let line = data_line(&chat_chunk(ChunkPosition::Initial))?;
        self.state = StreamState::InitialSent;
        Ok(vec![line])
    }

    /// Emit one content chunk, opening the stream first if needed.
    /// Fragments after [`finish`](Self::finish) are dropped.
    pub fn fragment(&mut self, fragment: &str) -> Result<Vec<String>> {
        if self.state == StreamState::DoneSent {
            return Ok(Vec::new());
        }
        let mut lines = self.start()?;
        lines.push(data_line(&chat_chunk(ChunkPosition::Middle(fragment)))?);
        self.state = StreamState::EmittingFragment;
        Ok(lines)
    }

    /// Emit the closing `stop` chunk and the `[DONE]` sentinel. Idempotent.
    pub fn finish(&mut self) -> Result<Vec<String>> {
        if self.state == StreamState::DoneSent {
            return Ok(Vec::new());
        }
        let mut lines = self.start()?;
        lines.push(data_line(&chat_chunk(ChunkPosition::Final))?);
        lines.push(DONE_LINE.to_string());
        self.state = StreamState::DoneSent;
        Ok(lines)
    }
}
