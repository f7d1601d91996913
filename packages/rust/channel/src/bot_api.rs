//! Telegram Bot API message source.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use linkdigest_shared::{LinkDigestError, Message, MessageId, Result};

use crate::{EditOutcome, MessageSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker in the error description Telegram returns for edits that change nothing.
const NOT_MODIFIED_MARKER: &str = "message is not modified";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    channel_post: Option<ChannelPost>,
    #[serde(default)]
    edited_channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

impl Chat {
    /// `channel` is either `@username`, a bare username, or the numeric chat id.
    fn matches(&self, channel: &str) -> bool {
        let wanted = channel.trim_start_matches('@');
        self.username
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            || self.id.to_string() == channel
    }
}

// ---------------------------------------------------------------------------
// BotApiSource
// ---------------------------------------------------------------------------

/// [`MessageSource`] over the Telegram Bot API.
///
/// The Bot API cannot page through channel history, so listing reads the channel posts still
/// held in `getUpdates`. Posts seen during a session are cached for `get_message`.
pub struct BotApiSource {
    http: Client,
    endpoint: String,
    posts: Mutex<HashMap<i64, Message>>,
}

impl BotApiSource {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
            posts: Mutex::new(HashMap::new()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .json(&body)
            .send()
            .await
            // reqwest errors can carry the URL, which embeds the token.
            .map_err(|e| LinkDigestError::Channel(format!("{method}: {}", e.without_url())))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await.map_err(|e| {
            LinkDigestError::Channel(format!("{method}: HTTP {status}: {}", e.without_url()))
        })?;

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| LinkDigestError::Channel(format!("{method}: empty result")));
        }

        let description = parsed.description.unwrap_or_default();
        if parsed.error_code == Some(429) || status.as_u16() == 429 {
            let secs = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(1);
            return Err(LinkDigestError::RateLimited {
                retry_after: Duration::from_secs(secs),
            });
        }

        Err(LinkDigestError::Channel(format!(
            "{method} failed ({}): {description}",
            parsed.error_code.unwrap_or(status.as_u16())
        )))
    }

    /// Read pending channel posts for `channel`, newest first, with edits folded in.
    async fn fetch_posts(&self, channel: &str) -> Result<Vec<Message>> {
        let mut updates: Vec<Update> = self
            .call(
                "getUpdates",
                serde_json::json!({ "allowed_updates": ["channel_post", "edited_channel_post"] }),
            )
            .await?;
        updates.sort_by_key(|u| u.update_id);

        let mut latest: HashMap<i64, Message> = HashMap::new();
        for update in updates {
            let Some(post) = update.edited_channel_post.or(update.channel_post) else {
                continue;
            };
            if !post.chat.matches(channel) {
                continue;
            }
            let text = post.text.or(post.caption).unwrap_or_default();
            latest.insert(post.message_id, Message::new(post.message_id, text));
        }

        let mut posts: Vec<Message> = latest.into_values().collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));

        let mut cache = self.lock_posts()?;
        for post in &posts {
            cache.insert(post.id.0, post.clone());
        }
        Ok(posts)
    }

    fn lock_posts(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Message>>> {
        self.posts
            .lock()
            .map_err(|_| LinkDigestError::Channel("post cache poisoned".into()))
    }

    fn cached(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.lock_posts()?.get(&id.0).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

#[async_trait]
impl MessageSource for BotApiSource {
    async fn connect(&self) -> Result<()> {
        let me: BotUser = self.call("getMe", serde_json::json!({})).await?;
        info!(bot = me.username.as_deref().unwrap_or("?"), "connected to Bot API");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.lock_posts()?.clear();
        debug!("Bot API session closed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, channel: &str, limit: usize) -> Result<Vec<Message>> {
        let mut posts = self.fetch_posts(channel).await?;
        posts.truncate(limit);
        debug!(count = posts.len(), "listed channel posts");
        Ok(posts)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_message(&self, channel: &str, id: MessageId) -> Result<Option<Message>> {
        if let Some(found) = self.cached(id)? {
            return Ok(Some(found));
        }
        self.fetch_posts(channel).await?;
        self.cached(id)
    }

    #[instrument(skip(self, text), fields(id = %id))]
    async fn edit_message(&self, channel: &str, id: MessageId, text: &str) -> Result<EditOutcome> {
        let body = serde_json::json!({
            "chat_id": channel,
            "message_id": id.0,
            "text": text,
        });

        match self.call::<serde_json::Value>("editMessageText", body).await {
            Ok(_) => {
                if let Some(post) = self.lock_posts()?.get_mut(&id.0) {
                    post.text = text.to_string();
                }
                Ok(EditOutcome::Edited)
            }
            Err(LinkDigestError::Channel(msg)) if msg.contains(NOT_MODIFIED_MARKER) => {
                warn!("edit left the message unchanged");
                Ok(EditOutcome::NotModified)
            }
            Err(e) => Err(e),
        }
    }
}
