//! Access to the channel whose posts carry the links.
//!
//! [`MessageSource`] is the seam between the pipeline and the messaging service:
//! - [`BotApiSource`] talks to the Telegram Bot API over HTTPS
//! - [`MemorySource`] keeps a channel in memory and records every edit

pub mod bot_api;
pub mod memory;

use async_trait::async_trait;

use linkdigest_shared::{Message, MessageId, Result};

pub use bot_api::BotApiSource;
pub use memory::MemorySource;

/// Result of a successful edit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message text was replaced.
    Edited,
    /// The service reported that the new text equals the current one.
    NotModified,
}

/// A channel that can be listed, read by id, and edited.
///
/// Implementations signal throttling with [`LinkDigestError::RateLimited`]; callers sleep for
/// the indicated duration and repeat the call.
///
/// [`LinkDigestError::RateLimited`]: linkdigest_shared::LinkDigestError::RateLimited
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Open the session. Failing here is fatal for a pass.
    async fn connect(&self) -> Result<()>;

    /// Release the session. Called on every exit path.
    async fn disconnect(&self) -> Result<()>;

    /// Up to `limit` messages, in the order the service returns them.
    async fn list_messages(&self, channel: &str, limit: usize) -> Result<Vec<Message>>;

    /// The current version of message `id`, or `None` if it no longer exists.
    async fn get_message(&self, channel: &str, id: MessageId) -> Result<Option<Message>>;

    /// Replace the text of message `id`.
    async fn edit_message(&self, channel: &str, id: MessageId, text: &str) -> Result<EditOutcome>;
}
