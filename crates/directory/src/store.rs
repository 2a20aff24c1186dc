//! Persistence trait for the user directory.

use {
    async_trait::async_trait,
    topicdesk_common::types::{ThreadId, UserId},
    tracing::debug,
};

use crate::{Result, types::UserRecord};

/// Persistence backend for user records and the thread reverse index.
///
/// `upsert` writes the forward record and, when the record carries a thread,
/// the reverse entry for it in one atomic step. Reverse entries for threads a
/// user no longer owns are not removed; use [`DirectoryStore::lookup_by_thread`]
/// rather than trusting [`DirectoryStore::resolve_by_thread`] directly.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<UserRecord>>;
    async fn upsert(&self, record: &UserRecord) -> Result<()>;
    /// Raw reverse lookup. May return a stale owner.
    async fn resolve_by_thread(&self, thread: ThreadId) -> Result<Option<UserId>>;
    /// All known users, in no particular order.
    async fn list_identities(&self) -> Result<Vec<UserId>>;

    /// Reverse lookup validated against the forward record.
    async fn lookup_by_thread(&self, thread: ThreadId) -> Result<Option<UserRecord>> {
        let Some(id) = self.resolve_by_thread(thread).await? else {
            return Ok(None);
        };
        match self.get(id).await? {
            Some(record) if record.thread == Some(thread) => Ok(Some(record)),
            _ => {
                debug!(thread_id = %thread, user_id = %id, "ignoring stale thread index entry");
                Ok(None)
            },
        }
    }
}
