use std::path::Path;

use {
    clap::Subcommand,
    topicdesk_common::types::UserId,
    topicdesk_directory::{DirectoryStore, SqliteDirectory, UserRecord},
};

#[derive(Subcommand)]
pub enum UsersAction {
    /// List every known user with their topic.
    List,
    /// Print one user record as JSON.
    Show {
        /// Telegram user id.
        id: i64,
    },
}

pub async fn handle_users(action: UsersAction, config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, _) = crate::load_config(config_path)?;
    let directory = SqliteDirectory::new(&crate::database_url(&config)?).await?;

    match action {
        UsersAction::List => list(&directory).await,
        UsersAction::Show { id } => show(&directory, UserId(id)).await,
    }
}

async fn list(directory: &dyn DirectoryStore) -> anyhow::Result<()> {
    let mut ids = directory.list_identities().await?;
    ids.sort();
    if ids.is_empty() {
        println!("No users yet.");
        return Ok(());
    }

    println!("{:<14} {:<10} {:<8} NAME", "ID", "TOPIC", "FLAGS");
    for id in ids {
        if let Some(record) = directory.get(id).await? {
            println!("{}", summary_line(&record));
        }
    }
    Ok(())
}

async fn show(directory: &dyn DirectoryStore, id: UserId) -> anyhow::Result<()> {
    match directory.get(id).await? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => anyhow::bail!("user {id} not found"),
    }
    Ok(())
}

fn summary_line(record: &UserRecord) -> String {
    let topic = record
        .thread
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut flags = String::new();
    if record.is_blocked {
        flags.push('B');
    }
    if record.silent_mode {
        flags.push('S');
    }
    if flags.is_empty() {
        flags.push('-');
    }
    format!(
        "{:<14} {:<10} {:<8} {} ({})",
        record.id,
        topic,
        flags,
        record.display_name,
        record.membership,
    )
}
