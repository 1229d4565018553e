//! In-memory backend that plays back a fixed reply. Records every call so
//! tests can assert on how the gateway drove it.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use slack_claude_gateway::backend::{ChatBackend, Conversation, FragmentStream};
use slack_claude_gateway::{GatewayError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Failure {
    Open,
    Send,
    /// Fail after this many fragments have been streamed.
    MidStream(usize),
}

#[derive(Debug, Default)]
struct Calls {
    opens: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    fragments: Vec<String>,
    failure: Option<Failure>,
    stall: bool,
    calls: Arc<Calls>,
}

impl ScriptedBackend {
    /// The full reply is the concatenation of `fragments`.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: None,
            stall: false,
            calls: Arc::default(),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            failure: Some(Failure::Open),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn failing_send() -> Self {
        Self {
            failure: Some(Failure::Send),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn failing_after(mut self, fragments: usize) -> Self {
        self.failure = Some(Failure::MidStream(fragments));
        self
    }

    /// Keep the fragment stream pending forever once the fragments are out.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.calls.opens.load(Ordering::SeqCst)
    }

    /// Prompts sent, across all conversations, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open(&self) -> Result<Box<dyn Conversation>> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        if matches!(self.failure, Some(Failure::Open)) {
            return Err(GatewayError::backend("scripted open failure"));
        }
        Ok(Box::new(ScriptedConversation {
            backend: self.clone(),
            sent: false,
        }))
    }
}

struct ScriptedConversation {
    backend: ScriptedBackend,
    sent: bool,
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send(&mut self, text: &str) -> Result<()> {
        if matches!(self.backend.failure, Some(Failure::Send)) {
            return Err(GatewayError::backend("scripted send failure"));
        }
        self.backend.calls.prompts.lock().unwrap().push(text.to_string());
        self.sent = true;
        Ok(())
    }

    async fn reply(&mut self) -> Result<String> {
        if !self.sent {
            return Err(GatewayError::backend("no message sent"));
        }
        if let Some(Failure::MidStream(_)) = self.backend.failure {
            return Err(GatewayError::backend("scripted reply failure"));
        }
        Ok(self.backend.fragments.concat())
    }

    fn fragments(self: Box<Self>) -> FragmentStream {
        let cut = match self.backend.failure {
            Some(Failure::MidStream(n)) => Some(n),
            _ => None,
        };
        let mut items: Vec<Result<String>> = self
            .backend
            .fragments
            .iter()
            .take(cut.unwrap_or(usize::MAX))
            .cloned()
            .map(Ok)
            .collect();
        if cut.is_some() {
            items.push(Err(GatewayError::backend("scripted stream failure")));
        }
        if self.backend.stall {
            Box::pin(stream::iter(items).chain(stream::pending()))
        } else {
            Box::pin(stream::iter(items))
        }
    }
}
