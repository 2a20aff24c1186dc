//! User- and staff-visible texts produced by the relay.

use topicdesk_common::types::UserId;

/// Everything the relay may say. Rendering is left to a [`NoticeCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// To a user: their message reached the staff.
    MessageSent,
    /// To a user: edits are not relayed.
    MessageEdited,
    /// To a blocked user: the message was not accepted.
    MessageRejected,
    /// To staff: the reply reached the user.
    MessageSentToUser,
    /// To staff: the user blocked the bot.
    BlockedByUser,
    /// To staff: the reply was held back because silent mode is on.
    SilentSuppressed,
    /// To either side: delivery failed for another reason.
    MessageNotSent,
    UserBlocked,
    UserUnblocked,
    SilentEnabled,
    SilentDisabled,
    /// Greeting card pinned at the top of a new topic.
    UserStarted { name: String, url: String },
    UserRestarted { name: String, url: String },
    UserStopped { name: String, url: String },
    UserInformation {
        id: UserId,
        name: String,
        handle: String,
    },
}

/// Renders a [`Notice`] as HTML in the given locale.
pub trait NoticeCatalog: Send + Sync {
    fn render(&self, notice: &Notice, locale: &str) -> String;
}
