/// Config schema types (bot credentials, storage, relay timings, languages).
use std::collections::HashMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicdeskConfig {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
    pub i18n: I18nConfig,
}

/// Bot credentials and the two fixed conversations it works with.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Operator that receives fatal errors and diagnostics.
    pub dev_id: i64,

    /// The forum-enabled supergroup holding one topic per user.
    pub group_id: i64,

    /// Custom emoji used as the icon of newly created topics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_icon_emoji_id: Option<String>,

    /// Repository link shown by the /source command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("dev_id", &self.dev_id)
            .field("group_id", &self.group_id)
            .field("topic_icon_emoji_id", &self.topic_icon_emoji_id)
            .field("source_url", &self.source_url)
            .finish()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            dev_id: 0,
            group_id: 0,
            topic_icon_emoji_id: None,
            source_url: None,
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Persistent storage for the user directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL. Defaults to `sqlite://<data_dir>/topicdesk.db?mode=rwc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Timing and sizing knobs of the relay pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long an album is held after its first part arrives.
    pub album_latency_ms: u64,
    /// Hard expiry of an album buffer, flushed or not.
    pub album_ttl_ms: u64,
    /// Maximum number of albums buffered at once.
    pub album_capacity: usize,
    /// Delay before an acknowledgment is removed again.
    pub ack_delete_after_secs: u64,
    /// Window of the default debounce bucket.
    pub default_throttle_ms: u64,
    /// Per-bucket debounce windows, overriding the default.
    pub throttle_buckets: HashMap<String, u64>,
    /// Delay before the greeting card is posted into a new topic.
    pub greeting_delay_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            album_latency_ms: 200,
            album_ttl_ms: 300,
            album_capacity: 10_000,
            ack_delete_after_secs: 5,
            default_throttle_ms: 1_000,
            throttle_buckets: HashMap::new(),
            greeting_delay_secs: 3,
        }
    }
}

/// Languages offered to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct I18nConfig {
    /// Enabled locales, in the order they are offered.
    pub languages: Vec<String>,
    pub default_language: String,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".into(), "ru".into()],
            default_language: "en".into(),
        }
    }
}

impl I18nConfig {
    /// Returns `true` if `code` is one of the enabled locales.
    pub fn is_enabled(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l == code)
    }

    /// Maps a client language code onto an enabled locale, falling back to
    /// the default language.
    pub fn resolve<'a>(&'a self, code: Option<&'a str>) -> &'a str {
        match code {
            Some(c) if self.is_enabled(c) => c,
            _ => &self.default_language,
        }
    }
}
