use std::sync::Arc;

use {
    topicdesk_common::types::ChatId,
    topicdesk_relay::RelayEngine,
};

use crate::{outbound::TelegramPlatform, texts::Texts};

/// Everything an update handler needs, shared by all update tasks.
pub struct BotContext {
    pub bot: teloxide::Bot,
    pub bot_username: Option<String>,
    pub engine: Arc<RelayEngine>,
    pub platform: Arc<TelegramPlatform>,
    pub texts: Arc<Texts>,
}

impl BotContext {
    /// The staff forum group.
    pub fn group(&self) -> ChatId {
        self.engine.settings().group
    }

    pub fn languages(&self) -> &[String] {
        &self.engine.settings().languages
    }
}
