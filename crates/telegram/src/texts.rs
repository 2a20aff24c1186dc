//! Localized texts (English and Russian). Everything is HTML.

use {
    topicdesk_common::html::{code, escape_html, link},
    topicdesk_relay::{Notice, NoticeCatalog},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    En,
    Ru,
}

impl Lang {
    /// Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ru" => Self::Ru,
            _ => Self::En,
        }
    }
}

/// Texts shown outside of the relay flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKey {
    SelectLanguage,
    ChangeLanguage,
    MainMenu,
    Source,
}

/// Button label for a language choice.
pub fn language_label(code: &str) -> String {
    match code {
        "en" => "🇬🇧 English".to_string(),
        "ru" => "🇷🇺 Русский".to_string(),
        other => other.to_string(),
    }
}

pub struct Texts {
    source_url: Option<String>,
}

impl Texts {
    pub fn new(source_url: Option<String>) -> Self {
        Self {
            source_url: source_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn text(&self, key: TextKey, locale: &str) -> String {
        let lang = Lang::from_code(locale);
        match (key, lang) {
            (TextKey::SelectLanguage, Lang::En) => "👋 <b>Hello!</b>\n\nPlease choose your language:".into(),
            (TextKey::SelectLanguage, Lang::Ru) => "👋 <b>Здравствуйте!</b>\n\nПожалуйста, выберите язык:".into(),
            (TextKey::ChangeLanguage, Lang::En) => "Choose the language you want to use:".into(),
            (TextKey::ChangeLanguage, Lang::Ru) => "Выберите язык, который хотите использовать:".into(),
            (TextKey::MainMenu, Lang::En) => {
                "✍️ <b>Write your question</b> and we will answer here as soon as possible.".into()
            },
            (TextKey::MainMenu, Lang::Ru) => {
                "✍️ <b>Напишите свой вопрос</b>, и мы ответим здесь как можно скорее.".into()
            },
            (TextKey::Source, lang) => self.source(lang),
        }
    }

    fn source(&self, lang: Lang) -> String {
        let intro = match lang {
            Lang::En => "This bot is open source and distributed under the MIT license.",
            Lang::Ru => "Исходный код бота открыт и распространяется по лицензии MIT.",
        };
        match &self.source_url {
            Some(url) => format!("{intro}\n\n{}", link(url, url)),
            None => intro.to_string(),
        }
    }
}

impl Default for Texts {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NoticeCatalog for Texts {
    fn render(&self, notice: &Notice, locale: &str) -> String {
        let lang = Lang::from_code(locale);
        match notice {
            Notice::MessageSent => match lang {
                Lang::En => "<b>Message sent!</b>".into(),
                Lang::Ru => "<b>Сообщение отправлено!</b>".into(),
            },
            Notice::MessageEdited => match lang {
                Lang::En => "<b>The message was edited only on your side.</b>\nTo send an edited \
                             message, send it as a new one."
                    .into(),
                Lang::Ru => "<b>Сообщение изменено только у вас.</b>\nЧтобы отправить \
                             исправленный текст, пришлите его новым сообщением."
                    .into(),
            },
            Notice::MessageRejected => match lang {
                Lang::En => "<b>Message not accepted.</b>".into(),
                Lang::Ru => "<b>Сообщение не принято.</b>".into(),
            },
            Notice::MessageSentToUser => match lang {
                Lang::En => "<b>Message sent to the user!</b>".into(),
                Lang::Ru => "<b>Сообщение отправлено пользователю!</b>".into(),
            },
            Notice::BlockedByUser => match lang {
                Lang::En => "<b>Message not sent!</b>\nThe user has blocked the bot.".into(),
                Lang::Ru => "<b>Сообщение не отправлено!</b>\nПользователь заблокировал бота.".into(),
            },
            Notice::SilentSuppressed => match lang {
                Lang::En => "<b>Message not sent!</b>\nSilent mode is on.".into(),
                Lang::Ru => "<b>Сообщение не отправлено!</b>\nВключён тихий режим.".into(),
            },
            Notice::MessageNotSent => match lang {
                Lang::En => "<b>Message not sent!</b>\nAn unexpected error occurred.".into(),
                Lang::Ru => "<b>Сообщение не отправлено!</b>\nПроизошла непредвиденная ошибка.".into(),
            },
            Notice::UserBlocked => match lang {
                Lang::En => "<b>User blocked!</b>\nMessages from the user will not be accepted.".into(),
                Lang::Ru => "<b>Пользователь заблокирован!</b>\nСообщения от него не будут приниматься.".into(),
            },
            Notice::UserUnblocked => match lang {
                Lang::En => "<b>User unblocked!</b>\nMessages from the user are accepted again.".into(),
                Lang::Ru => "<b>Пользователь разблокирован!</b>\nСообщения от него снова принимаются.".into(),
            },
            Notice::SilentEnabled => match lang {
                Lang::En => "<b>Silent mode enabled!</b>\nReplies will not be delivered to the user.".into(),
                Lang::Ru => "<b>Тихий режим включён!</b>\nОтветы не будут доставляться пользователю.".into(),
            },
            Notice::SilentDisabled => match lang {
                Lang::En => "<b>Silent mode disabled!</b>\nThe user receives replies again.".into(),
                Lang::Ru => "<b>Тихий режим выключен!</b>\nПользователь снова получает ответы.".into(),
            },
            Notice::UserStarted { name, url } => match lang {
                Lang::En => format!("User {} started the bot!", link(name, url)),
                Lang::Ru => format!("Пользователь {} запустил бота!", link(name, url)),
            },
            Notice::UserRestarted { name, url } => match lang {
                Lang::En => format!("User {} restarted the bot!", link(name, url)),
                Lang::Ru => format!("Пользователь {} перезапустил бота!", link(name, url)),
            },
            Notice::UserStopped { name, url } => match lang {
                Lang::En => format!("User {} stopped the bot!", link(name, url)),
                Lang::Ru => format!("Пользователь {} остановил бота!", link(name, url)),
            },
            Notice::UserInformation { id, name, handle } => {
                let (id_label, name_label, handle_label) = match lang {
                    Lang::En => ("ID", "Name", "Username"),
                    Lang::Ru => ("ID", "Имя", "Username"),
                };
                format!(
                    "<b>{id_label}:</b>\n- {}\n<b>{name_label}:</b>\n- {}\n<b>{handle_label}:</b>\n- {}",
                    code(&id.to_string()),
                    escape_html(name),
                    escape_html(handle),
                )
            },
        }
    }
}
