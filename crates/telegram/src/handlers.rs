//! Routing of Telegram updates into relay events.
//!
//! [`route_message`] is a pure classification of one message; the async
//! handlers run the result against the engine or answer locally.

use {
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageTextSetters, SendMessageSetters},
        prelude::*,
        types::{
            CallbackQuery, ChatMemberUpdated, InlineKeyboardButton, InlineKeyboardMarkup,
            MediaKind, MessageKind, ParseMode, ThreadId as TgThreadId, Update, UpdateKind,
            User,
        },
    },
    topicdesk_common::{
        html::code,
        types::{
            BurstId, ChatId, ContentKind, ContentPart, Destination, MessageId, MessageRef,
            ThreadId, UserId,
        },
    },
    topicdesk_directory::MembershipState,
    topicdesk_relay::{
        DEFAULT_BUCKET, InboundEvent, InboundMessage, Platform, Profile, RelayOutcome,
        StaffCommand,
    },
    tracing::{debug, warn},
};

use crate::{
    commands::{PrivateCommand, command_name},
    error::Result,
    outbound::tg_chat,
    render::entities_html,
    state::BotContext,
    texts::{TextKey, language_label},
};

/// What to do with one inbound message.
#[derive(Debug, PartialEq)]
pub enum Route {
    /// Hand to the relay engine.
    Relay(InboundEvent),
    /// A private command answered by the adapter itself.
    Command {
        command: PrivateCommand,
        profile: Profile,
        message: MessageRef,
    },
    /// `/id` in any group: answer with the chat id.
    ShowChatId(MessageRef),
    /// Service noise in the staff group.
    DeleteService(MessageRef),
    Ignore(&'static str),
}

pub fn route_message(msg: &Message, group: ChatId, bot_username: Option<&str>) -> Route {
    let chat = ChatId(msg.chat.id.0);
    let origin = MessageRef::new(chat, MessageId(msg.id.0));

    if msg.chat.is_private() {
        let Some(profile) = msg.from.as_ref().and_then(profile_of) else {
            return Route::Ignore("private message without sender");
        };
        if let Some(name) = msg.text().and_then(|t| command_name(t, bot_username))
            && let Some(command) = PrivateCommand::parse(&name)
        {
            return Route::Command {
                command,
                profile,
                message: origin,
            };
        }
        return match inbound_message(msg, origin) {
            Some(message) => Route::Relay(InboundEvent::Private { profile, message }),
            None => Route::Ignore("private service message"),
        };
    }

    if msg.text().and_then(|t| command_name(t, bot_username)).as_deref() == Some("id") {
        return Route::ShowChatId(origin);
    }
    if chat != group {
        return Route::Ignore("message outside the staff group");
    }

    match &msg.kind {
        MessageKind::ForumTopicCreated(_) => match msg.thread_id {
            Some(thread) => Route::Relay(InboundEvent::ThreadCreated {
                thread: thread_of(thread),
            }),
            None => Route::Ignore("topic created without an id"),
        },
        MessageKind::Pinned(_)
        | MessageKind::ForumTopicEdited(_)
        | MessageKind::ForumTopicClosed(_)
        | MessageKind::ForumTopicReopened(_) => Route::DeleteService(origin),
        MessageKind::Common(_) => route_staff_message(msg, origin, bot_username),
        _ => Route::Ignore("unhandled service message"),
    }
}

fn route_staff_message(msg: &Message, origin: MessageRef, bot_username: Option<&str>) -> Route {
    let Some(thread) = msg.thread_id.filter(|_| msg.is_topic_message) else {
        return Route::Ignore("message in the general topic");
    };
    let Some(sender) = msg.from.as_ref().filter(|u| !u.is_bot) else {
        return Route::Ignore("staff message without a human sender");
    };
    let Ok(sender) = i64::try_from(sender.id.0).map(UserId) else {
        return Route::Ignore("sender id out of range");
    };
    let thread = thread_of(thread);

    let command = msg
        .text()
        .and_then(|t| command_name(t, bot_username))
        .and_then(|name| match name.as_str() {
            "ban" => Some(StaffCommand::Ban),
            "silent" => Some(StaffCommand::Silent),
            "information" => Some(StaffCommand::Information),
            _ => None,
        });
    if let Some(command) = command {
        return Route::Relay(InboundEvent::StaffCommand {
            sender,
            thread,
            command,
            message: origin,
        });
    }

    match inbound_message(msg, origin) {
        Some(message) => Route::Relay(InboundEvent::Staff {
            sender,
            thread,
            message,
        }),
        None => Route::Ignore("staff service message"),
    }
}

fn inbound_message(msg: &Message, origin: MessageRef) -> Option<InboundMessage> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let (kind, file_id) = match &common.media_kind {
        MediaKind::Text(_) => (ContentKind::Text, None),
        MediaKind::Photo(p) => (
            ContentKind::Photo,
            p.photo.last().map(|ps| ps.file.id.clone()),
        ),
        MediaKind::Video(v) => (ContentKind::Video, Some(v.video.file.id.clone())),
        MediaKind::Audio(a) => (ContentKind::Audio, Some(a.audio.file.id.clone())),
        MediaKind::Document(d) => (ContentKind::Document, Some(d.document.file.id.clone())),
        _ => (ContentKind::Other, None),
    };
    Some(InboundMessage {
        part: ContentPart::new(kind, file_id.map(|id| id.0), origin),
        burst_id: msg.media_group_id().map(|id| BurstId::new(id.to_string())),
        caption: msg
            .caption()
            .map(|text| entities_html(text, msg.caption_entities().unwrap_or_default())),
    })
}

fn profile_of(user: &User) -> Option<Profile> {
    let id = i64::try_from(user.id.0).ok()?;
    Some(Profile {
        user: UserId(id),
        display_name: user.full_name(),
        handle_name: user.username.clone(),
        language_code: user.language_code.clone(),
    })
}

fn thread_of(thread: TgThreadId) -> ThreadId {
    ThreadId(thread.0.0)
}

/// Run one update to completion.
pub async fn handle_update(ctx: &BotContext, update: &Update) -> Result<()> {
    match &update.kind {
        UpdateKind::Message(msg) => handle_message(ctx, msg).await,
        UpdateKind::EditedMessage(msg) => handle_edited_message(ctx, msg).await,
        UpdateKind::CallbackQuery(query) => handle_callback_query(ctx, query).await,
        UpdateKind::MyChatMember(member) => handle_my_chat_member(ctx, member).await,
        other => {
            debug!("ignoring update: {other:?}");
            Ok(())
        },
    }
}

async fn handle_message(ctx: &BotContext, msg: &Message) -> Result<()> {
    match route_message(msg, ctx.group(), ctx.bot_username.as_deref()) {
        Route::Relay(event) => {
            let outcome = ctx.engine.handle(event).await?;
            debug!(chat_id = msg.chat.id.0, ?outcome, "message handled");
        },
        Route::Command {
            command,
            profile,
            message,
        } => run_private_command(ctx, command, &profile, message).await?,
        Route::ShowChatId(message) => {
            let text = code(&message.chat.to_string());
            if let Err(e) = ctx
                .platform
                .send_text(Destination::chat(message.chat), &text, Some(message.message))
                .await
            {
                warn!(chat_id = %message.chat, error = %e, "failed to answer /id");
            }
        },
        Route::DeleteService(message) => {
            if let Err(e) = ctx.platform.delete_message(message).await {
                debug!(error = %e, "could not delete service message");
            }
        },
        Route::Ignore(reason) => debug!(chat_id = msg.chat.id.0, reason, "ignoring message"),
    }
    Ok(())
}

async fn handle_edited_message(ctx: &BotContext, msg: &Message) -> Result<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(profile) = msg.from.as_ref().and_then(profile_of) else {
        return Ok(());
    };
    let message = MessageRef::new(ChatId(msg.chat.id.0), MessageId(msg.id.0));
    ctx.engine
        .handle(InboundEvent::PrivateEdited { profile, message })
        .await?;
    Ok(())
}

async fn run_private_command(
    ctx: &BotContext,
    command: PrivateCommand,
    profile: &Profile,
    message: MessageRef,
) -> Result<()> {
    if let Err(e) = ctx.platform.delete_message(message).await {
        debug!(error = %e, "could not delete command message");
    }
    if !ctx.engine.admit(profile.user, DEFAULT_BUCKET) {
        return Ok(());
    }

    let user = ctx.engine.resolve_identity(profile).await?;
    let locale = ctx.engine.locale_for(&user, Some(profile));
    let chat = tg_chat(message.chat);
    let keyboard = || language_keyboard(ctx.languages());

    match command {
        PrivateCommand::Start if user.locale.is_some() => {
            send_html(ctx, chat, ctx.texts.text(TextKey::MainMenu, &locale), None).await
        },
        PrivateCommand::Start => {
            let text = ctx.texts.text(TextKey::SelectLanguage, &locale);
            send_html(ctx, chat, text, Some(keyboard())).await
        },
        PrivateCommand::Language => {
            let text = ctx.texts.text(TextKey::ChangeLanguage, &locale);
            send_html(ctx, chat, text, Some(keyboard())).await
        },
        PrivateCommand::Source => {
            send_html(ctx, chat, ctx.texts.text(TextKey::Source, &locale), None).await
        },
    }
}

async fn handle_callback_query(ctx: &BotContext, query: &CallbackQuery) -> Result<()> {
    let data = query.data.as_deref().unwrap_or_default();
    let is_language = ctx.languages().iter().any(|l| l == data);

    if is_language && let Some(profile) = profile_of(&query.from) {
        let outcome = ctx
            .engine
            .handle(InboundEvent::LocaleChosen {
                profile,
                locale: data.to_string(),
            })
            .await?;
        if outcome == RelayOutcome::Applied
            && let Some(message) = &query.message
        {
            let text = ctx.texts.text(TextKey::MainMenu, data);
            match ctx
                .bot
                .edit_message_text(message.chat().id, message.id(), text)
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {},
                Err(e) => warn!(error = %e, "failed to show main menu"),
            }
        }
    }

    ctx.bot.answer_callback_query(query.id.clone()).await?;
    Ok(())
}

async fn handle_my_chat_member(ctx: &BotContext, update: &ChatMemberUpdated) -> Result<()> {
    if !update.chat.is_private() {
        return Ok(());
    }
    let Some(profile) = profile_of(&update.from) else {
        return Ok(());
    };
    let state = if update.new_chat_member.kind.is_present() {
        MembershipState::Active
    } else {
        MembershipState::Stopped
    };
    ctx.engine
        .handle(InboundEvent::Membership { profile, state })
        .await?;
    Ok(())
}

fn language_keyboard(languages: &[String]) -> InlineKeyboardMarkup {
    let row: Vec<_> = languages
        .iter()
        .map(|code| InlineKeyboardButton::callback(language_label(code), code.clone()))
        .collect();
    InlineKeyboardMarkup::new([row])
}

async fn send_html(
    ctx: &BotContext,
    chat: teloxide::types::ChatId,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let mut req = ctx.bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(keyboard) = keyboard {
        req = req.reply_markup(keyboard);
    }
    req.await?;
    Ok(())
}
