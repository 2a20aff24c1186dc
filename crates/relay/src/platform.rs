//! Outbound contract with the messaging platform.
//!
//! Adapters classify raw platform failures once, at this boundary, into
//! [`PlatformError`]. Nothing above this module inspects error text.

use std::time::Duration;

use {
    async_trait::async_trait,
    topicdesk_common::types::{ChatId, ContentUnit, Destination, MessageId, MessageRef, ThreadId},
};

/// Typed platform failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("rate limited, retry after {}s", .0.as_secs())]
    RetryAfter(Duration),

    #[error("message thread not found")]
    ThreadNotFound,

    #[error("recipient blocked the bot")]
    RecipientBlocked,

    #[error("not enough rights")]
    InsufficientRights,

    #[error("chat is not a forum")]
    NotAForum,

    #[error("message no longer exists")]
    MessageGone,

    #[error("rejected by platform: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Outbound operations the relay needs. Message text is HTML.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Copy a single message or a whole burst to `to`. Returns the ids of the
    /// messages created.
    async fn copy(&self, unit: &ContentUnit, to: Destination) -> PlatformResult<Vec<MessageId>>;

    /// Create a topic in a forum chat.
    async fn create_thread(
        &self,
        chat: ChatId,
        title: &str,
        icon_emoji_id: Option<&str>,
    ) -> PlatformResult<ThreadId>;

    async fn send_text(
        &self,
        to: Destination,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> PlatformResult<MessageId>;

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()>;

    /// Pin without notifying chat members.
    async fn pin_message(&self, message: MessageRef) -> PlatformResult<()>;

    async fn unpin_message(&self, message: MessageRef) -> PlatformResult<()>;

    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> PlatformResult<MessageId>;
}
