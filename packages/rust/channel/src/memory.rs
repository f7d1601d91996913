//! In-memory message source.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use linkdigest_shared::{LinkDigestError, Message, MessageId, Result};

use crate::{EditOutcome, MessageSource};

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    edits: Vec<(MessageId, String)>,
    failing_edits: HashSet<MessageId>,
    not_modified: HashSet<MessageId>,
    rate_limits: HashMap<MessageId, (Duration, u32)>,
}

/// A channel held in memory, ignoring the channel name.
///
/// Messages are listed in insertion order. Every successful edit is appended to an edit log.
/// Failure injection covers connection errors, per-message edit errors, rate limits and
/// service-side "not modified" replies.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
    fail_connect: bool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MemorySource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            state: Mutex::new(State {
                messages,
                ..State::default()
            }),
            ..Self::default()
        }
    }

    /// Make `connect` fail.
    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make every edit of `id` fail with a channel error.
    pub fn with_edit_failure(self, id: impl Into<MessageId>) -> Self {
        self.lock().failing_edits.insert(id.into());
        self
    }

    /// Rate-limit the first edit of `id` for `retry_after`.
    pub fn with_rate_limit(self, id: impl Into<MessageId>, retry_after: Duration) -> Self {
        self.with_rate_limits(id, retry_after, 1)
    }

    /// Rate-limit the next `times` edits of `id` for `retry_after` each.
    pub fn with_rate_limits(
        self,
        id: impl Into<MessageId>,
        retry_after: Duration,
        times: u32,
    ) -> Self {
        if times > 0 {
            self.lock().rate_limits.insert(id.into(), (retry_after, times));
        }
        self
    }

    /// Answer every edit of `id` with [`EditOutcome::NotModified`], whatever the text.
    pub fn with_not_modified(self, id: impl Into<MessageId>) -> Self {
        self.lock().not_modified.insert(id.into());
        self
    }

    /// Current state of the channel.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Text of `id`, if present.
    pub fn text_of(&self, id: impl Into<MessageId>) -> Option<String> {
        let id = id.into();
        self.lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.text.clone())
    }

    /// Successful edits in call order.
    pub fn edits(&self) -> Vec<(MessageId, String)> {
        self.lock().edits.clone()
    }

    /// Drop a message, as if it was deleted from the channel.
    pub fn remove(&self, id: impl Into<MessageId>) {
        let id = id.into();
        self.lock().messages.retain(|m| m.id != id);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test body must not hide the state from later assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(LinkDigestError::Channel("connection refused".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_messages(&self, _channel: &str, limit: usize) -> Result<Vec<Message>> {
        Ok(self.lock().messages.iter().take(limit).cloned().collect())
    }

    async fn get_message(&self, _channel: &str, id: MessageId) -> Result<Option<Message>> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn edit_message(&self, _channel: &str, id: MessageId, text: &str) -> Result<EditOutcome> {
        let mut state = self.lock();

        if let Some((retry_after, remaining)) = state.rate_limits.get_mut(&id) {
            let retry_after = *retry_after;
            *remaining -= 1;
            if *remaining == 0 {
                state.rate_limits.remove(&id);
            }
            return Err(LinkDigestError::RateLimited { retry_after });
        }
        if state.failing_edits.contains(&id) {
            return Err(LinkDigestError::Channel(format!("cannot edit message {id}")));
        }
        if state.not_modified.contains(&id) {
            return Ok(EditOutcome::NotModified);
        }

        let Some(message) = state.messages.iter_mut().find(|m| m.id == id) else {
            return Err(LinkDigestError::Channel(format!("message {id} not found")));
        };
        if message.text == text {
            return Ok(EditOutcome::NotModified);
        }

        message.text = text.to_string();
        state.edits.push((id, text.to_string()));
        debug!(%id, "edited in-memory message");
        Ok(EditOutcome::Edited)
    }
}
