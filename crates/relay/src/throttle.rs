use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::time::Instant,
    topicdesk_common::types::UserId,
    tracing::debug,
};

/// Name of the bucket used when an action does not pick its own.
pub const DEFAULT_BUCKET: &str = "default";

const CLEANUP_EVERY_CHECKS: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GateKey {
    bucket: String,
    user: UserId,
}

/// Per-user suppression windows, one independent window per bucket.
///
/// The first trigger in a bucket is admitted and starts the window; further
/// triggers from the same user in that bucket are refused until it elapses.
/// Refused triggers do not extend the window.
pub struct DebounceGate {
    default_window: Duration,
    windows: HashMap<String, Duration>,
    admitted: DashMap<GateKey, Instant>,
    checks_seen: AtomicU64,
}

impl DebounceGate {
    pub fn new(default_window: Duration, windows: HashMap<String, Duration>) -> Self {
        Self {
            default_window,
            windows,
            admitted: DashMap::new(),
            checks_seen: AtomicU64::new(0),
        }
    }

    /// Window length for `bucket`; unknown buckets use the default window.
    pub fn window_for(&self, bucket: &str) -> Duration {
        self.windows
            .get(bucket)
            .copied()
            .unwrap_or(self.default_window)
    }

    #[must_use]
    pub fn admit(&self, user: UserId, bucket: &str) -> bool {
        self.admit_at(user, bucket, Instant::now())
    }

    fn admit_at(&self, user: UserId, bucket: &str, now: Instant) -> bool {
        let window = self.window_for(bucket);
        let key = GateKey {
            bucket: bucket.to_string(),
            user,
        };
        let admitted = match self.admitted.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) >= window {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            },
        };

        if !admitted {
            debug!(user_id = %user, bucket, "debounced duplicate trigger");
        }
        self.cleanup_if_needed(now);
        admitted
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.checks_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_CHECKS) {
            return;
        }
        let longest = self.max_window();
        self.admitted
            .retain(|_, started| now.duration_since(*started) < longest);
    }

    fn max_window(&self) -> Duration {
        self.windows
            .values()
            .copied()
            .chain(std::iter::once(self.default_window))
            .max()
            .unwrap_or(self.default_window)
    }

    /// Number of live entries, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), HashMap::new())
    }
}
