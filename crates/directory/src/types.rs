use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    topicdesk_common::types::{MessageId, ThreadId, UserId},
};

/// Topic titles are capped by the platform.
pub const MAX_THREAD_TITLE_CHARS: usize = 128;

/// Whether the user currently has the private chat with the bot open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    #[default]
    Active,
    Stopped,
}

impl MembershipState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" | "member" => Ok(Self::Active),
            "stopped" | "kicked" => Ok(Self::Stopped),
            other => Err(format!("unknown membership state {other:?}")),
        }
    }
}

/// Everything the relay knows about one end-user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// The user's topic in the staff group; `None` until first provisioned.
    pub thread: Option<ThreadId>,
    pub display_name: String,
    /// Public username without the leading `@`.
    pub handle_name: Option<String>,
    pub membership: MembershipState,
    /// Set by staff; blocked users are not relayed to the group.
    pub is_blocked: bool,
    /// Set by staff; staff replies are not delivered while enabled.
    pub silent_mode: bool,
    /// Pinned message marking silent mode in the topic.
    pub silent_marker: Option<MessageId>,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A freshly seen user without a topic.
    pub fn new(
        id: UserId,
        display_name: impl Into<String>,
        handle_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            thread: None,
            display_name: display_name.into(),
            handle_name: normalize_handle(handle_name),
            membership: MembershipState::Active,
            is_blocked: false,
            silent_mode: false,
            silent_marker: None,
            locale: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the mutable profile fields. Returns `true` if anything changed.
    pub fn refresh_profile(
        &mut self,
        display_name: impl Into<String>,
        handle_name: Option<String>,
    ) -> bool {
        let display_name = display_name.into();
        let handle_name = normalize_handle(handle_name);
        let changed = self.display_name != display_name || self.handle_name != handle_name;
        self.display_name = display_name;
        self.handle_name = handle_name;
        changed
    }

    /// Link to the user's profile: the public username when there is one,
    /// otherwise a deep link by id.
    pub fn profile_url(&self) -> String {
        match &self.handle_name {
            Some(handle) => format!("https://t.me/{handle}"),
            None => format!("tg://user?id={}", self.id),
        }
    }

    /// `@handle`, or `-` when the user has no public username.
    pub fn handle_label(&self) -> String {
        match &self.handle_name {
            Some(handle) => format!("@{handle}"),
            None => "-".to_string(),
        }
    }

    /// Title for the user's topic: the display name, truncated to the
    /// platform limit, falling back to the id when the name is blank.
    pub fn thread_title(&self) -> String {
        let name = self.display_name.trim();
        if name.is_empty() {
            return self.id.to_string();
        }
        name.chars().take(MAX_THREAD_TITLE_CHARS).collect()
    }
}

fn normalize_handle(handle: Option<String>) -> Option<String> {
    handle
        .map(|h| h.trim().trim_start_matches('@').to_string())
        .filter(|h| !h.is_empty())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn record(name: &str, handle: Option<&str>) -> UserRecord {
        UserRecord::new(UserId(7), name, handle.map(String::from), Utc::now())
    }

    #[test]
    fn new_record_has_no_thread() {
        let r = record("Ann", None);
        assert_eq!(r.thread, None);
        assert_eq!(r.membership, MembershipState::Active);
        assert!(!r.is_blocked);
        assert!(!r.silent_mode);
        assert_eq!(r.created_at, r.updated_at);
    }

    #[rstest]
    #[case(Some("ann"), "https://t.me/ann", "@ann")]
    #[case(Some("@ann"), "https://t.me/ann", "@ann")]
    #[case(Some("  "), "tg://user?id=7", "-")]
    #[case(None, "tg://user?id=7", "-")]
    fn profile_links(#[case] handle: Option<&str>, #[case] url: &str, #[case] label: &str) {
        let r = record("Ann", handle);
        assert_eq!(r.profile_url(), url);
        assert_eq!(r.handle_label(), label);
    }

    #[test]
    fn refresh_reports_changes() {
        let mut r = record("Ann", Some("ann"));
        assert!(!r.refresh_profile("Ann", Some("ann".into())));
        assert!(r.refresh_profile("Ann B", None));
        assert_eq!(r.display_name, "Ann B");
        assert_eq!(r.handle_name, None);
    }

    #[test]
    fn thread_title_is_capped() {
        let r = record(&"é".repeat(200), None);
        assert_eq!(r.thread_title().chars().count(), MAX_THREAD_TITLE_CHARS);
    }

    #[test]
    fn blank_name_falls_back_to_id() {
        assert_eq!(record("   ", None).thread_title(), "7");
    }

    #[rstest]
    #[case("active", MembershipState::Active)]
    #[case("member", MembershipState::Active)]
    #[case("stopped", MembershipState::Stopped)]
    #[case("kicked", MembershipState::Stopped)]
    fn membership_parsing(#[case] raw: &str, #[case] expected: MembershipState) {
        assert_eq!(raw.parse::<MembershipState>().unwrap(), expected);
    }

    #[test]
    fn record_serializes_ids_as_numbers() {
        let mut r = record("Ann", None);
        r.thread = Some(ThreadId(55));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["thread"], 55);
        assert_eq!(json["membership"], "active");
    }
}
