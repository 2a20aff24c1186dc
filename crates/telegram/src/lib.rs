//! Telegram adapter for the topicdesk relay.
//!
//! Long-polls the Bot API, turns updates into relay events and implements
//! the relay's outbound platform with teloxide.

pub mod bot;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod render;
pub mod state;
pub mod texts;

pub use {
    bot::{connect, poll, run},
    error::{Error, Result},
    outbound::TelegramPlatform,
    state::BotContext,
    texts::Texts,
};
