use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::TopicdeskConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "topicdesk.toml",
    "topicdesk.yaml",
    "topicdesk.yml",
    "topicdesk.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<TopicdeskConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./topicdesk.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/topicdesk/topicdesk.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TopicdeskConfig::default()` if no config file is found. The
/// returned path is the file actually loaded, if any.
pub fn discover_and_load() -> (TopicdeskConfig, Option<PathBuf>) {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return (cfg, Some(path)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    (TopicdeskConfig::default(), None)
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/topicdesk/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "topicdesk").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory, or `./` when the platform has none.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "topicdesk")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Apply `BOT_*` and `TOPICDESK_*` environment variables on top of a loaded
/// config.
pub fn apply_env_overrides(config: TopicdeskConfig) -> Result<TopicdeskConfig> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: TopicdeskConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<TopicdeskConfig> {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = non_empty("BOT_TOKEN") {
        config.bot.token = Secret::new(token);
    }
    if let Some(raw) = non_empty("BOT_DEV_ID") {
        config.bot.dev_id = parse_env_id("BOT_DEV_ID", &raw)?;
    }
    if let Some(raw) = non_empty("BOT_GROUP_ID") {
        config.bot.group_id = parse_env_id("BOT_GROUP_ID", &raw)?;
    }
    if let Some(emoji) = non_empty("BOT_EMOJI_ID") {
        config.bot.topic_icon_emoji_id = Some(emoji);
    }
    if let Some(url) = non_empty("BOT_SOURCE_URL") {
        config.bot.source_url = Some(url);
    }
    if let Some(url) = non_empty("TOPICDESK_DATABASE_URL") {
        config.storage.database_url = Some(url);
    }
    Ok(config)
}

fn parse_env_id(name: &'static str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| Error::InvalidEnv {
        name,
        value: raw.to_string(),
    })
}

fn parse_config(raw: &str, path: &Path) -> Result<TopicdeskConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse("TOML", path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse("YAML", path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse("JSON", path, e)),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
