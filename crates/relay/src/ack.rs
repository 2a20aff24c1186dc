//! Short-lived acknowledgments.

use std::{sync::Arc, time::Duration};

use {
    topicdesk_common::types::{Destination, MessageId, MessageRef},
    tracing::{debug, warn},
};

use crate::platform::Platform;

/// Replies to a message and removes the reply again after a fixed delay.
///
/// Failures are logged and swallowed: an acknowledgment that cannot be sent
/// or deleted never fails the relay that produced it.
pub struct Acknowledger {
    platform: Arc<dyn Platform>,
    delete_after: Duration,
}

impl Acknowledger {
    pub fn new(platform: Arc<dyn Platform>, delete_after: Duration) -> Self {
        Self {
            platform,
            delete_after,
        }
    }

    /// Send `text` as a reply in `to` and schedule its removal. Returns the
    /// id of the acknowledgment when it was sent.
    pub async fn send(
        &self,
        to: Destination,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> Option<MessageId> {
        let id = match self.platform.send_text(to, text, reply_to).await {
            Ok(id) => id,
            Err(e) => {
                warn!(chat_id = %to.chat, error = %e, "failed to send acknowledgment");
                return None;
            },
        };

        let platform = Arc::clone(&self.platform);
        let delay = self.delete_after;
        let message = MessageRef::new(to.chat, id);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = platform.delete_message(message).await {
                debug!(chat_id = %message.chat, error = %e, "acknowledgment already gone");
            }
        });
        Some(id)
    }
}
