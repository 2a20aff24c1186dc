//! Identifiers and the content model that flows through the relay.
//!
//! Identifiers are thin newtypes over the platform's integer ids so that a
//! user id can never be passed where a thread handle is expected.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$inner>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($kind, s))
            }
        }
    };
}

integer_id!(
    /// Stable platform identity of an end-user.
    UserId(i64),
    "user"
);
integer_id!(
    /// A conversation on the platform (private chat or the staff group).
    ChatId(i64),
    "chat"
);
integer_id!(
    /// A per-user sub-thread inside the staff workspace.
    ThreadId(i32),
    "thread"
);
integer_id!(
    /// A single message inside a conversation.
    MessageId(i32),
    "message"
);

impl From<UserId> for ChatId {
    /// Private conversations share the user's id.
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}

/// Correlation id shared by all parts of one multi-part post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BurstId(pub String);

impl BurstId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BurstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message located in a specific conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message: MessageId,
}

impl MessageRef {
    pub fn new(chat: ChatId, message: MessageId) -> Self {
        Self { chat, message }
    }
}

/// Where an outbound copy lands: a conversation and, for the staff
/// workspace, the sub-thread inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub chat: ChatId,
    pub thread: Option<ThreadId>,
}

impl Destination {
    pub fn chat(chat: ChatId) -> Self {
        Self { chat, thread: None }
    }

    pub fn thread(chat: ChatId, thread: ThreadId) -> Self {
        Self {
            chat,
            thread: Some(thread),
        }
    }
}

/// Content category of a single part, preserved through burst coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Audio,
    Document,
    Other,
}

impl ContentKind {
    /// Whether the part can travel inside a multi-part payload.
    #[must_use]
    pub fn is_groupable(self) -> bool {
        matches!(self, Self::Photo | Self::Video | Self::Audio | Self::Document)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other => "other",
        }
    }
}

/// One inbound content item: its category, the platform file reference (for
/// media), and the original message it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    pub kind: ContentKind,
    pub file_id: Option<String>,
    pub source: MessageRef,
}

impl ContentPart {
    pub fn new(kind: ContentKind, file_id: Option<String>, source: MessageRef) -> Self {
        Self {
            kind,
            file_id,
            source,
        }
    }
}

/// The coalesced parts of one burst, in arrival order, with one shared caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstUnit {
    pub burst_id: BurstId,
    pub parts: Vec<ContentPart>,
    /// Caption of the first part that carried one.
    pub caption: Option<String>,
}

impl BurstUnit {
    /// The first message of the burst; acknowledgments reply to it.
    pub fn origin(&self) -> Option<MessageRef> {
        self.parts.first().map(|p| p.source)
    }
}

/// What gets copied across: a single message or a coalesced burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentUnit {
    Single(ContentPart),
    Burst(BurstUnit),
}

impl ContentUnit {
    /// The message an acknowledgment should reply to.
    pub fn origin(&self) -> Option<MessageRef> {
        match self {
            Self::Single(part) => Some(part.source),
            Self::Burst(unit) => unit.origin(),
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Burst(unit) => unit.parts.len(),
        }
    }
}
