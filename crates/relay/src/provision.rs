//! Topic creation with platform back-off.

use std::sync::Arc;

use {
    topicdesk_common::types::{ChatId, ThreadId},
    topicdesk_directory::UserRecord,
    tracing::{error, info, warn},
};

use crate::platform::{Platform, PlatformError};

/// Why a topic could not be created. The messages are shown to the operator
/// as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("The bot doesn't have sufficient rights to create a forum topic.")]
    InsufficientRights,

    #[error(
        "The chat is not configured as a forum, or you lack the necessary permissions to manage \
         topics. Please activate topics first or request administrator privileges."
    )]
    NotAForum,

    #[error(
        "Unable to create a topic on the forum. The chat was not found, or forum topics are not \
         activated."
    )]
    Rejected { detail: String },
}

/// Creates per-user topics in the staff group.
pub struct ThreadProvisioner {
    platform: Arc<dyn Platform>,
    group: ChatId,
    icon_emoji_id: Option<String>,
}

impl ThreadProvisioner {
    pub fn new(platform: Arc<dyn Platform>, group: ChatId, icon_emoji_id: Option<String>) -> Self {
        Self {
            platform,
            group,
            icon_emoji_id: icon_emoji_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Create a topic named after the user.
    ///
    /// Rate limits are waited out and retried without bound; every other
    /// failure is final.
    pub async fn provision(&self, user: &UserRecord) -> Result<ThreadId, ProvisionError> {
        let title = user.thread_title();
        loop {
            match self
                .platform
                .create_thread(self.group, &title, self.icon_emoji_id.as_deref())
                .await
            {
                Ok(thread) => {
                    info!(user_id = %user.id, thread_id = %thread, "created topic");
                    return Ok(thread);
                },
                Err(PlatformError::RetryAfter(wait)) => {
                    warn!(
                        user_id = %user.id,
                        retry_after_secs = wait.as_secs(),
                        "topic creation rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                },
                Err(PlatformError::InsufficientRights) => {
                    return Err(ProvisionError::InsufficientRights);
                },
                Err(PlatformError::NotAForum) => return Err(ProvisionError::NotAForum),
                Err(other) => {
                    error!(
                        user_id = %user.id,
                        group_id = %self.group,
                        title = %title,
                        error = %other,
                        "topic creation rejected"
                    );
                    return Err(ProvisionError::Rejected {
                        detail: other.to_string(),
                    });
                },
            }
        }
    }
}
