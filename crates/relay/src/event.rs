//! Platform-neutral inbound events and their outcomes.

use {
    serde::Serialize,
    topicdesk_common::types::{BurstId, ContentPart, MessageRef, ThreadId, UserId},
    topicdesk_directory::MembershipState,
};

/// Who is writing from the private side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user: UserId,
    pub display_name: String,
    pub handle_name: Option<String>,
    /// Client language, if the platform reported one.
    pub language_code: Option<String>,
}

impl Profile {
    pub fn new(user: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user,
            display_name: display_name.into(),
            handle_name: None,
            language_code: None,
        }
    }
}

/// One relayable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub part: ContentPart,
    /// Set when the message is one part of a multi-part post.
    pub burst_id: Option<BurstId>,
    pub caption: Option<String>,
}

impl InboundMessage {
    pub fn single(part: ContentPart) -> Self {
        Self {
            part,
            burst_id: None,
            caption: None,
        }
    }

    pub fn origin(&self) -> MessageRef {
        self.part.source
    }
}

/// Commands staff can issue inside a user's topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffCommand {
    /// Flip the user's block flag.
    Ban,
    /// Flip silent mode for the topic.
    Silent,
    /// Post the user's identity card.
    Information,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A user wrote to the bot.
    Private {
        profile: Profile,
        message: InboundMessage,
    },
    /// A user edited a message they had sent before.
    PrivateEdited {
        profile: Profile,
        message: MessageRef,
    },
    /// Staff wrote inside a user's topic.
    Staff {
        sender: UserId,
        thread: ThreadId,
        message: InboundMessage,
    },
    StaffCommand {
        sender: UserId,
        thread: ThreadId,
        command: StaffCommand,
        message: MessageRef,
    },
    /// The platform confirmed a topic was created.
    ThreadCreated { thread: ThreadId },
    /// The user started or stopped the bot.
    Membership {
        profile: Profile,
        state: MembershipState,
    },
    LocaleChosen { profile: Profile, locale: String },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Private { .. } => "private",
            Self::PrivateEdited { .. } => "private_edited",
            Self::Staff { .. } => "staff",
            Self::StaffCommand { .. } => "staff_command",
            Self::ThreadCreated { .. } => "thread_created",
            Self::Membership { .. } => "membership",
            Self::LocaleChosen { .. } => "locale_chosen",
        }
    }
}

/// How an event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Copied to the other side.
    Delivered,
    /// The user is blocked; nothing was copied.
    Blocked,
    /// Silent mode held back a staff reply.
    SilentSuppressed,
    /// The user has blocked the bot.
    RecipientBlocked,
    Failed,
    /// Refused by the debounce gate.
    Debounced,
    /// Merged into a burst another task is relaying.
    Coalesced,
    /// No user owns the topic.
    UnknownThread,
    /// State changed without relaying content.
    Applied,
    Ignored,
}
