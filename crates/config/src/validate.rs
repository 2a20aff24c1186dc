//! Semantic checks on a loaded configuration.
//!
//! Parsing already rejects malformed files; this catches values that parse
//! fine but cannot work (missing token, a group id that is not a supergroup,
//! album windows that never flush).

use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::schema::TopicdeskConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "range", "i18n"
    pub category: &'static str,
    /// Dotted path, e.g. "relay.album_ttl_ms"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a configuration. `config_path` is carried through for reporting.
pub fn validate(config: &TopicdeskConfig, config_path: Option<PathBuf>) -> ValidationResult {
    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path,
    };

    check_bot(config, &mut result);
    check_relay(config, &mut result);
    check_i18n(config, &mut result);

    result
}

fn check_bot(config: &TopicdeskConfig, result: &mut ValidationResult) {
    let bot = &config.bot;
    if bot.token.expose_secret().trim().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "bot.token",
            "bot token is empty (set bot.token or BOT_TOKEN)",
        );
    }
    if bot.dev_id == 0 {
        result.push(
            Severity::Error,
            "missing",
            "bot.dev_id",
            "operator id is not set (set bot.dev_id or BOT_DEV_ID)",
        );
    }
    if bot.group_id >= 0 {
        result.push(
            Severity::Error,
            "range",
            "bot.group_id",
            format!(
                "group id {} is not a supergroup id (expected a negative id such as -100...)",
                bot.group_id
            ),
        );
    }
    if bot
        .topic_icon_emoji_id
        .as_deref()
        .is_some_and(|id| id.trim().is_empty())
    {
        result.push(
            Severity::Warning,
            "range",
            "bot.topic_icon_emoji_id",
            "empty emoji id is ignored",
        );
    }
}

fn check_relay(config: &TopicdeskConfig, result: &mut ValidationResult) {
    let relay = &config.relay;
    if relay.album_latency_ms == 0 {
        result.push(
            Severity::Error,
            "range",
            "relay.album_latency_ms",
            "album latency must be greater than zero",
        );
    }
    if relay.album_latency_ms >= relay.album_ttl_ms {
        result.push(
            Severity::Error,
            "range",
            "relay.album_ttl_ms",
            format!(
                "album ttl ({} ms) must exceed album latency ({} ms), otherwise albums expire \
                 before they are flushed",
                relay.album_ttl_ms, relay.album_latency_ms
            ),
        );
    }
    if relay.album_capacity == 0 {
        result.push(
            Severity::Error,
            "range",
            "relay.album_capacity",
            "album capacity must be greater than zero",
        );
    }
    if relay.default_throttle_ms == 0 {
        result.push(
            Severity::Error,
            "range",
            "relay.default_throttle_ms",
            "default throttle window must be greater than zero",
        );
    }
    let mut buckets: Vec<_> = relay.throttle_buckets.iter().collect();
    buckets.sort();
    for (bucket, ms) in buckets {
        if *ms == 0 {
            result.push(
                Severity::Error,
                "range",
                &format!("relay.throttle_buckets.{bucket}"),
                "throttle window must be greater than zero",
            );
        }
    }
    if relay.ack_delete_after_secs == 0 {
        result.push(
            Severity::Warning,
            "range",
            "relay.ack_delete_after_secs",
            "acknowledgments are removed immediately",
        );
    }
}

fn check_i18n(config: &TopicdeskConfig, result: &mut ValidationResult) {
    let i18n = &config.i18n;
    if i18n.languages.is_empty() {
        result.push(
            Severity::Error,
            "i18n",
            "i18n.languages",
            "at least one language must be enabled",
        );
        return;
    }
    if !i18n.is_enabled(&i18n.default_language) {
        result.push(
            Severity::Error,
            "i18n",
            "i18n.default_language",
            format!(
                "default language {:?} is not in i18n.languages",
                i18n.default_language
            ),
        );
    }
}
