//! Configuration loading, validation, and env substitution.
//!
//! Config files: `topicdesk.toml`, `topicdesk.yaml`, `topicdesk.yml`, or
//! `topicdesk.json`. Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, data_dir, discover_and_load, load_config},
    schema::{BotConfig, I18nConfig, RelayConfig, StorageConfig, TopicdeskConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
