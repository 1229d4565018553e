//! The chat backend as a capability: open a conversation, send one message,
//! then read the reply either whole or as a stream of appended fragments.

pub mod slack;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Lazy, finite, forward-only sequence of reply fragments in arrival order.
/// Dropping it stops the backend from being polled.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a fresh conversation. Conversations are never reused across requests.
    async fn open(&self) -> Result<Box<dyn Conversation>>;
}

#[async_trait]
pub trait Conversation: Send {
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Wait for the complete reply to the last message sent.
    async fn reply(&mut self) -> Result<String>;

    /// Consume the conversation as a stream of reply fragments.
    fn fragments(self: Box<Self>) -> FragmentStream;
}

pub use slack::SlackBackend;
