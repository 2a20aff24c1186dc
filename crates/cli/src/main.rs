mod config_commands;
mod db_commands;
mod users_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    topicdesk_config::{Severity, TopicdeskConfig},
    topicdesk_directory::SqliteDirectory,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "topicdesk", about = "topicdesk: a Telegram support desk on forum topics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "TOPICDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot (default when no subcommand is provided).
    Run,
    /// Inspect the user directory.
    Users {
        #[command(subcommand)]
        action: users_commands::UsersAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management (reset, migrate).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

/// Dependency targets held at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["teloxide", "hyper", "reqwest", "sqlx"];

fn default_filter(level: &str) -> String {
    std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&cli.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the config from `path` or the standard locations, then apply
/// environment overrides.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<(TopicdeskConfig, Option<PathBuf>)> {
    let (config, loaded_from) = match path {
        Some(path) => (
            topicdesk_config::load_config(path)?,
            Some(path.to_path_buf()),
        ),
        None => topicdesk_config::discover_and_load(),
    };
    Ok((topicdesk_config::apply_env_overrides(config)?, loaded_from))
}

/// Configured database URL, or `topicdesk.db` in the data directory.
pub(crate) fn database_url(config: &TopicdeskConfig) -> anyhow::Result<String> {
    if let Some(url) = &config.storage.database_url {
        return Ok(url.clone());
    }
    let data_dir = topicdesk_config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    Ok(format!(
        "sqlite:{}?mode=rwc",
        data_dir.join("topicdesk.db").display()
    ))
}

async fn run_bot(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, loaded_from) = load_config(config_path)?;
    let report = topicdesk_config::validate(&config, loaded_from);
    for d in &report.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if report.has_errors() {
        anyhow::bail!("invalid configuration, run `topicdesk config check` for details");
    }

    let directory = Arc::new(SqliteDirectory::new(&database_url(&config)?).await?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    topicdesk_telegram::run(&config, directory, cancel).await?;
    info!("topicdesk stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "topicdesk starting");

    let config_path = cli.config.as_deref();
    match cli.command {
        None | Some(Commands::Run) => run_bot(config_path).await,
        Some(Commands::Users { action }) => users_commands::handle_users(action, config_path).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, config_path),
        Some(Commands::Db { action }) => db_commands::handle_db(action, config_path).await,
    }
}
