use thiserror::Error;

use crate::{platform::PlatformError, provision::ProvisionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Directory(#[from] topicdesk_directory::Error),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Short type-like name used in operator reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Directory(_) => "DirectoryError",
            Self::Platform(_) => "PlatformError",
            Self::Provision(_) => "ProvisionError",
            Self::Message { .. } => "RelayError",
            Self::External { .. } => "ExternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
