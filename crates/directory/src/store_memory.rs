//! In-memory directory for tests and throwaway deployments.

use std::{collections::HashMap, sync::Mutex};

use {
    async_trait::async_trait,
    topicdesk_common::types::{ThreadId, UserId},
};

use crate::{Result, store::DirectoryStore, types::UserRecord};

#[derive(Default)]
struct Maps {
    users: HashMap<UserId, UserRecord>,
    threads: HashMap<ThreadId, UserId>,
}

/// Directory backed by two `HashMap`s under one lock, so the forward record
/// and its reverse entry always change together. No persistence.
#[derive(Default)]
pub struct InMemoryDirectory {
    maps: Mutex<Maps>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the directory with existing records.
    pub fn with_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let mut maps = Maps::default();
        for record in records {
            if let Some(thread) = record.thread {
                maps.threads.insert(thread, record.id);
            }
            maps.users.insert(record.id, record);
        }
        Self {
            maps: Mutex::new(maps),
        }
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        Ok(maps.users.get(&id).cloned())
    }

    async fn upsert(&self, record: &UserRecord) -> Result<()> {
        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(thread) = record.thread {
            maps.threads.insert(thread, record.id);
        }
        let created_at = maps
            .users
            .get(&record.id)
            .map_or(record.created_at, |existing| existing.created_at);
        let mut stored = record.clone();
        stored.created_at = created_at;
        maps.users.insert(record.id, stored);
        Ok(())
    }

    async fn resolve_by_thread(&self, thread: ThreadId) -> Result<Option<UserId>> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        Ok(maps.threads.get(&thread).copied())
    }

    async fn list_identities(&self) -> Result<Vec<UserId>> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        Ok(maps.users.keys().copied().collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::store::contract};

    #[tokio::test]
    async fn missing_user_is_absent() {
        contract::missing_user_is_absent(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn upsert_then_get() {
        contract::upsert_then_get(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn thread_is_indexed() {
        contract::thread_is_indexed(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn replaced_thread_is_a_miss() {
        contract::replaced_thread_is_a_miss(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn thread_reassigned_to_other_user() {
        contract::thread_reassigned_to_other_user(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn flags_round_trip() {
        contract::flags_round_trip(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn lists_every_identity_once() {
        contract::lists_every_identity_once(&InMemoryDirectory::new()).await;
    }

    #[tokio::test]
    async fn seeded_records_are_indexed() {
        let mut record = contract::user(8, "Gus");
        record.thread = Some(ThreadId(80));
        let store = InMemoryDirectory::with_records([record]);
        assert_eq!(
            store.lookup_by_thread(ThreadId(80)).await.unwrap().unwrap().id,
            UserId(8)
        );
    }

    #[tokio::test]
    async fn created_at_is_kept_on_update() {
        let store = InMemoryDirectory::new();
        let first = contract::user(9, "Hal");
        store.upsert(&first).await.unwrap();
        let mut later = first.clone();
        later.created_at = first.created_at + chrono::Duration::hours(1);
        store.upsert(&later).await.unwrap();
        assert_eq!(
            store.get(UserId(9)).await.unwrap().unwrap().created_at,
            first.created_at
        );
    }
}
