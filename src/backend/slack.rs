//! Backend that chats with the Claude app through the Slack Web API.
//!
//! A conversation is a direct-message channel with the Claude app. The app
//! answers by posting one message and editing it as it writes; while it is
//! still writing, the text ends with a typing marker. Replies are read by
//! polling `conversations.history` for that message.

use super::{ChatBackend, Conversation, FragmentStream};
use crate::config::SlackConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Deserialize)]
struct OpenResponse {
    channel: ChannelInfo,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    ts: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
}

/// Claude's reply as of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReplySnapshot {
    text: String,
    complete: bool,
}

struct SlackApi {
    client: reqwest::Client,
    api_base: String,
    user_token: String,
    claude_user_id: String,
    poll_interval: Duration,
    reply_timeout: Duration,
    typing_marker: String,
}

impl SlackApi {
    async fn call<T: DeserializeOwned>(&self, method: &str, form: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.api_base.trim_end_matches('/'), method);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.user_token)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::backend(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::backend(format!(
                "{method} returned status {}",
                status.as_u16()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::backend(format!("{method} returned invalid JSON: {e}")))?;

        if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let code = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown_error");
            return Err(GatewayError::backend(format!("{method} failed: {code}")));
        }

        serde_json::from_value(body)
            .map_err(|e| GatewayError::backend(format!("{method} returned unexpected body: {e}")))
    }

    /// Claude's earliest message after `after_ts`, if it has started replying.
    async fn snapshot(&self, channel: &str, after_ts: &str) -> Result<Option<ReplySnapshot>> {
        let history: HistoryResponse = self
            .call(
                "conversations.history",
                &[("channel", channel), ("oldest", after_ts)],
            )
            .await?;

        // History is newest first.
        let reply = history
            .messages
            .into_iter()
            .filter(|m| m.user.as_deref() == Some(self.claude_user_id.as_str()))
            .filter(|m| m.ts.as_str() != after_ts)
            .last();

        Ok(reply.map(|m| self.read_snapshot(&m.text)))
    }

    fn read_snapshot(&self, text: &str) -> ReplySnapshot {
        let trimmed = text.trim_end();
        match trimmed.strip_suffix(self.typing_marker.as_str()) {
            Some(partial) => ReplySnapshot {
                text: partial.trim_end().to_string(),
                complete: false,
            },
            None => ReplySnapshot {
                text: trimmed.to_string(),
                complete: true,
            },
        }
    }
}

#[derive(Clone)]
pub struct SlackBackend {
    api: Arc<SlackApi>,
}

impl SlackBackend {
    /// Build from config, reading credentials from the configured environment variables.
    pub fn from_config(client: reqwest::Client, config: &SlackConfig) -> Result<Self> {
        let user_token = config.resolve_user_token()?;
        let claude_user_id = config.resolve_claude_user_id()?;
        Ok(Self::with_credentials(client, config, user_token, claude_user_id))
    }

    pub fn with_credentials(
        client: reqwest::Client,
        config: &SlackConfig,
        user_token: impl Into<String>,
        claude_user_id: impl Into<String>,
    ) -> Self {
        Self {
            api: Arc::new(SlackApi {
                client,
                api_base: config.api_base.clone(),
                user_token: user_token.into(),
                claude_user_id: claude_user_id.into(),
                poll_interval: Duration::from_millis(config.poll_interval_ms),
                reply_timeout: Duration::from_secs(config.reply_timeout_secs),
                typing_marker: config.typing_marker.clone(),
            }),
        }
    }
}

#[async_trait]
impl ChatBackend for SlackBackend {
    async fn open(&self) -> Result<Box<dyn Conversation>> {
        let opened: OpenResponse = self
            .api
            .call("conversations.open", &[("users", self.api.claude_user_id.as_str())])
            .await?;

        tracing::debug!(channel = %opened.channel.id, "Opened Slack conversation");

        Ok(Box::new(SlackConversation {
            api: Arc::clone(&self.api),
            channel: opened.channel.id,
            sent_ts: None,
        }))
    }
}

struct SlackConversation {
    api: Arc<SlackApi>,
    channel: String,
    sent_ts: Option<String>,
}

impl SlackConversation {
    fn sent_ts(&self) -> Result<String> {
        self.sent_ts
            .clone()
            .ok_or_else(|| GatewayError::backend("no message sent in this conversation"))
    }
}

#[async_trait]
impl Conversation for SlackConversation {
    async fn send(&mut self, text: &str) -> Result<()> {
        let posted: PostResponse = self
            .api
            .call(
                "chat.postMessage",
                &[("channel", self.channel.as_str()), ("text", text)],
            )
            .await?;
        self.sent_ts = Some(posted.ts);
        Ok(())
    }

    async fn reply(&mut self) -> Result<String> {
        let after_ts = self.sent_ts()?;
        let deadline = Instant::now() + self.api.reply_timeout;

        loop {
            tokio::time::sleep(self.api.poll_interval).await;

            if let Some(snapshot) = self.api.snapshot(&self.channel, &after_ts).await? {
                if snapshot.complete {
                    return Ok(snapshot.text);
                }
            }

            if Instant::now() >= deadline {
                return Err(GatewayError::backend("timed out waiting for Claude to reply"));
            }
        }
    }

    fn fragments(self: Box<Self>) -> FragmentStream {
        Box::pin(poll_fragments(*self))
    }
}

/// Poll until the reply is complete, yielding whatever was appended since the
/// previous poll. A reply edited into something that no longer starts with the
/// text already yielded ends the stream with an error.
fn poll_fragments(conv: SlackConversation) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let after_ts = conv.sent_ts()?;
        let deadline = Instant::now() + conv.api.reply_timeout;
        let mut emitted = String::new();

        loop {
            tokio::time::sleep(conv.api.poll_interval).await;

            if let Some(snapshot) = conv.api.snapshot(&conv.channel, &after_ts).await? {
                match snapshot.text.strip_prefix(emitted.as_str()) {
                    Some(appended) if !appended.is_empty() => {
                        let appended = appended.to_string();
                        emitted = snapshot.text.clone();
                        yield appended;
                    }
                    Some(_) => {}
                    None => {
                        tracing::warn!(
                            channel = %conv.channel,
                            emitted_chars = emitted.chars().count(),
                            "Reply was rewritten after fragments were sent"
                        );
                        Err::<(), _>(GatewayError::backend(
                            "reply was rewritten after fragments were sent",
                        ))?;
                    }
                }
                if snapshot.complete {
                    break;
                }
            }

            if Instant::now() >= deadline {
                Err::<(), _>(GatewayError::backend("timed out waiting for Claude to finish"))?;
            }
        }
    }
}
