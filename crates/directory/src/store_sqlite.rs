//! SQLite-backed directory using sqlx.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    topicdesk_common::types::{MessageId, ThreadId, UserId},
};

use crate::{
    Error, Result,
    store::DirectoryStore,
    types::{MembershipState, UserRecord},
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    thread_id: Option<i64>,
    display_name: String,
    handle_name: Option<String>,
    membership: String,
    is_blocked: bool,
    silent_mode: bool,
    silent_marker_id: Option<i64>,
    locale: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = Error;

    fn try_from(r: UserRow) -> Result<Self> {
        let id = r.id;
        let narrow = |value: i64, column: &str| {
            i32::try_from(value)
                .map_err(|_| Error::corrupt_row(id, format!("{column} out of range: {value}")))
        };
        let timestamp = |secs: i64, column: &str| {
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| Error::corrupt_row(id, format!("{column} out of range: {secs}")))
        };

        Ok(Self {
            id: UserId(id),
            thread: r
                .thread_id
                .map(|t| narrow(t, "thread_id").map(ThreadId))
                .transpose()?,
            display_name: r.display_name,
            handle_name: r.handle_name,
            membership: r
                .membership
                .parse::<MembershipState>()
                .map_err(|e| Error::corrupt_row(id, e))?,
            is_blocked: r.is_blocked,
            silent_mode: r.silent_mode,
            silent_marker: r
                .silent_marker_id
                .map(|m| narrow(m, "silent_marker_id").map(MessageId))
                .transpose()?,
            locale: r.locale,
            created_at: timestamp(r.created_at, "created_at")?,
            updated_at: timestamp(r.updated_at, "updated_at")?,
        })
    }
}

/// SQLite-backed persistence for user records and the thread index.
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    /// Create a new directory with its own connection pool and run migrations.
    ///
    /// For a pool shared with other components, use
    /// [`SqliteDirectory::with_pool`] after calling [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| Error::external("failed to connect to SQLite", e))?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a directory using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for SqliteDirectory {
    async fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, thread_id, display_name, handle_name, membership, is_blocked,
                    silent_mode, silent_marker_id, locale, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &UserRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, thread_id, display_name, handle_name, membership, is_blocked,
                                silent_mode, silent_marker_id, locale, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                display_name = excluded.display_name,
                handle_name = excluded.handle_name,
                membership = excluded.membership,
                is_blocked = excluded.is_blocked,
                silent_mode = excluded.silent_mode,
                silent_marker_id = excluded.silent_marker_id,
                locale = excluded.locale,
                updated_at = excluded.updated_at",
        )
        .bind(record.id.0)
        .bind(record.thread.map(|t| t.0))
        .bind(&record.display_name)
        .bind(&record.handle_name)
        .bind(record.membership.as_str())
        .bind(record.is_blocked)
        .bind(record.silent_mode)
        .bind(record.silent_marker.map(|m| m.0))
        .bind(&record.locale)
        .bind(record.created_at.timestamp())
        .bind(record.updated_at.timestamp())
        .execute(&mut *tx)
        .await?;

        if let Some(thread) = record.thread {
            sqlx::query(
                "INSERT INTO user_threads (thread_id, user_id) VALUES (?, ?)
                 ON CONFLICT(thread_id) DO UPDATE SET user_id = excluded.user_id",
            )
            .bind(thread.0)
            .bind(record.id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn resolve_by_thread(&self, thread: ThreadId) -> Result<Option<UserId>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT user_id FROM user_threads WHERE thread_id = ?")
                .bind(thread.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.map(UserId))
    }

    async fn list_identities(&self) -> Result<Vec<UserId>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}
