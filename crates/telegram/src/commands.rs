//! Command menus and command parsing.

use {
    teloxide::{
        payloads::{DeleteMyCommandsSetters, SetMyCommandsSetters},
        prelude::*,
        types::{BotCommand, BotCommandScope, Recipient},
    },
    topicdesk_common::types::ChatId,
    tracing::{debug, warn},
};

use crate::{outbound::tg_chat, texts::Lang};

/// Commands users can send in the private chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateCommand {
    Start,
    Source,
    Language,
}

impl PrivateCommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "source" => Some(Self::Source),
            "language" => Some(Self::Language),
            _ => None,
        }
    }
}

/// Split `/name@bot args` into the lowercase command name. Commands
/// addressed to another bot are not ours.
pub fn command_name(text: &str, bot_username: Option<&str>) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let body = first.strip_prefix('/')?;
    let (name, target) = match body.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (body, None),
    };
    if let (Some(target), Some(me)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(me)
    {
        return None;
    }
    (!name.is_empty()).then(|| name.to_lowercase())
}

pub fn private_commands(lang: Lang) -> Vec<BotCommand> {
    match lang {
        Lang::En => vec![
            BotCommand::new("start", "Restart the bot"),
            BotCommand::new("source", "Source code"),
            BotCommand::new("language", "Change language"),
        ],
        Lang::Ru => vec![
            BotCommand::new("start", "Перезапустить бота"),
            BotCommand::new("source", "Исходный код"),
            BotCommand::new("language", "Сменить язык"),
        ],
    }
}

pub fn group_commands(lang: Lang) -> Vec<BotCommand> {
    match lang {
        Lang::En => vec![
            BotCommand::new("ban", "Block or unblock the user"),
            BotCommand::new("silent", "Toggle silent mode"),
            BotCommand::new("information", "Show user information"),
        ],
        Lang::Ru => vec![
            BotCommand::new("ban", "Заблокировать или разблокировать пользователя"),
            BotCommand::new("silent", "Переключить тихий режим"),
            BotCommand::new("information", "Информация о пользователе"),
        ],
    }
}

/// The menu for every scope: the operator chat, all private chats and all
/// group chats.
fn menus(operator: ChatId, lang: Lang) -> Vec<(BotCommandScope, Vec<BotCommand>)> {
    vec![
        (
            BotCommandScope::Chat {
                chat_id: Recipient::Id(tg_chat(operator)),
            },
            private_commands(lang),
        ),
        (BotCommandScope::AllPrivateChats, private_commands(lang)),
        (BotCommandScope::AllGroupChats, group_commands(lang)),
    ]
}

/// Register menus in the default language and once per extra language.
pub async fn set_menus(bot: &Bot, operator: ChatId, default_language: &str, languages: &[String]) {
    for (scope, commands) in menus(operator, Lang::from_code(default_language)) {
        if let Err(e) = bot.set_my_commands(commands).scope(scope).await {
            warn!(error = %e, "failed to register bot commands");
        }
    }
    for code in languages.iter().filter(|code| *code != default_language) {
        for (scope, commands) in menus(operator, Lang::from_code(code)) {
            if let Err(e) = bot
                .set_my_commands(commands)
                .scope(scope)
                .language_code(code.clone())
                .await
            {
                warn!(language = %code, error = %e, "failed to register bot commands");
            }
        }
    }
    debug!("bot command menus registered");
}

/// Remove every menu registered by [`set_menus`].
pub async fn delete_menus(bot: &Bot, operator: ChatId, default_language: &str, languages: &[String]) {
    let lang = Lang::from_code(default_language);
    for (scope, _) in menus(operator, lang) {
        if let Err(e) = bot.delete_my_commands().scope(scope).await {
            warn!(error = %e, "failed to delete bot commands");
        }
    }
    for code in languages.iter().filter(|code| *code != default_language) {
        for (scope, _) in menus(operator, lang) {
            if let Err(e) = bot
                .delete_my_commands()
                .scope(scope)
                .language_code(code.clone())
                .await
            {
                warn!(language = %code, error = %e, "failed to delete bot commands");
            }
        }
    }
    debug!("bot command menus removed");
}
