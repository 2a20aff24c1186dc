use std::path::{Path, PathBuf};

use clap::Subcommand;

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete the default database file (topicdesk.db).
    Reset,
    /// Run all pending database migrations.
    Migrate,
}

pub async fn handle_db(action: DbAction, config_path: Option<&Path>) -> anyhow::Result<()> {
    match action {
        DbAction::Reset => reset_database(config_path),
        DbAction::Migrate => run_migrations(config_path).await,
    }
}

fn default_db_path() -> PathBuf {
    topicdesk_config::data_dir().join("topicdesk.db")
}

/// Delete the database together with its WAL and SHM files.
fn reset_database(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, _) = crate::load_config(config_path)?;
    if let Some(url) = &config.storage.database_url {
        anyhow::bail!("refusing to delete a custom database ({url}); remove it by hand");
    }

    let db = default_db_path();
    let mut deleted = false;
    for suffix in ["", "-wal", "-shm"] {
        let path = if suffix.is_empty() {
            db.clone()
        } else {
            db.with_extension(format!("db{suffix}"))
        };
        if path.exists() {
            std::fs::remove_file(&path)?;
            println!("Deleted: {}", path.display());
            deleted = true;
        }
    }

    if deleted {
        println!("Database deleted. Run `topicdesk db migrate` to recreate it.");
    } else {
        println!("No database file found.");
    }

    Ok(())
}

async fn run_migrations(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, _) = crate::load_config(config_path)?;
    let db_url = crate::database_url(&config)?;
    let pool = sqlx::SqlitePool::connect(&db_url).await?;

    println!("Running directory migrations...");
    topicdesk_directory::run_migrations(&pool).await?;

    pool.close().await;
    println!("All migrations complete.");
    Ok(())
}
