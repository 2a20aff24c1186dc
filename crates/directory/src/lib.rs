//! Durable mapping between end-users and their staff topics.
//!
//! Every user gets one [`UserRecord`]; the topic handle stored in it is
//! mirrored into a reverse index so that staff replies can be routed back.
//! Two backends: [`store_sqlite::SqliteDirectory`] for deployments and
//! [`store_memory::InMemoryDirectory`] for tests.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    store::DirectoryStore,
    store_memory::InMemoryDirectory,
    store_sqlite::SqliteDirectory,
    types::{MembershipState, UserRecord},
};

/// Run database migrations for the directory crate.
///
/// This creates the `users` and `user_threads` tables. Should be called at
/// application startup when using [`store_sqlite::SqliteDirectory::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
