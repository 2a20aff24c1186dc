use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        payloads::{
            CopyMessageSetters, CreateForumTopicSetters, PinChatMessageSetters,
            SendDocumentSetters, SendMediaGroupSetters, SendMessageSetters,
            UnpinChatMessageSetters,
        },
        prelude::*,
        types::{
            ChatId as TgChatId, CustomEmojiId, FileId, InputFile, InputMedia, InputMediaAudio, InputMediaDocument,
            InputMediaPhoto, InputMediaVideo, MessageId as TgMessageId, ParseMode,
            ReplyParameters, Rgb, ThreadId as TgThreadId,
        },
    },
    topicdesk_common::types::{
        BurstUnit, ChatId, ContentKind, ContentPart, ContentUnit, Destination, MessageId,
        MessageRef, ThreadId,
    },
    topicdesk_relay::{Platform, PlatformError, PlatformResult},
    tracing::{debug, warn},
};

/// Icon color of new topics when no custom emoji is configured.
const TOPIC_ICON_COLOR: u32 = 0x6F_B9_F0;

/// [`Platform`] backed by the Telegram Bot API.
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn copy_single(&self, part: &ContentPart, to: Destination) -> PlatformResult<MessageId> {
        let mut req = self.bot.copy_message(
            tg_chat(to.chat),
            tg_chat(part.source.chat),
            tg_message(part.source.message),
        );
        if let Some(thread) = to.thread {
            req = req.message_thread_id(tg_thread(thread));
        }
        let id = req.await.map_err(|e| classify_request_error(&e))?;
        Ok(MessageId(id.0))
    }

    async fn copy_burst(&self, unit: &BurstUnit, to: Destination) -> PlatformResult<Vec<MessageId>> {
        let Some(media) = media_group(unit) else {
            debug!(burst_id = %unit.burst_id, "burst cannot travel as a media group, copying parts");
            let mut ids = Vec::with_capacity(unit.parts.len());
            for part in &unit.parts {
                ids.push(self.copy_single(part, to).await?);
            }
            return Ok(ids);
        };

        let mut req = self.bot.send_media_group(tg_chat(to.chat), media);
        if let Some(thread) = to.thread {
            req = req.message_thread_id(tg_thread(thread));
        }
        let sent = req.await.map_err(|e| classify_request_error(&e))?;
        Ok(sent.iter().map(|m| MessageId(m.id.0)).collect())
    }
}

#[async_trait]
impl Platform for TelegramPlatform {
    async fn copy(&self, unit: &ContentUnit, to: Destination) -> PlatformResult<Vec<MessageId>> {
        match unit {
            ContentUnit::Single(part) => Ok(vec![self.copy_single(part, to).await?]),
            ContentUnit::Burst(burst) => self.copy_burst(burst, to).await,
        }
    }

    async fn create_thread(
        &self,
        chat: ChatId,
        title: &str,
        icon_emoji_id: Option<&str>,
    ) -> PlatformResult<ThreadId> {
        let mut req = self.bot.create_forum_topic(tg_chat(chat), title);
        req = req.icon_color(Rgb::from_u32(TOPIC_ICON_COLOR));
        if let Some(icon) = icon_emoji_id {
            req = req.icon_custom_emoji_id(CustomEmojiId(icon.to_owned()));
        }
        let topic = req.await.map_err(|e| classify_request_error(&e))?;
        Ok(ThreadId(topic.thread_id.0.0))
    }

    async fn send_text(
        &self,
        to: Destination,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> PlatformResult<MessageId> {
        let mut req = self
            .bot
            .send_message(tg_chat(to.chat), text)
            .parse_mode(ParseMode::Html);
        if let Some(thread) = to.thread {
            req = req.message_thread_id(tg_thread(thread));
        }
        if let Some(reply_to) = reply_to {
            req = req.reply_parameters(
                ReplyParameters::new(tg_message(reply_to)).allow_sending_without_reply(),
            );
        }
        let message = req.await.map_err(|e| classify_request_error(&e))?;
        Ok(MessageId(message.id.0))
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.bot
            .delete_message(tg_chat(message.chat), tg_message(message.message))
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }

    async fn pin_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.bot
            .pin_chat_message(tg_chat(message.chat), tg_message(message.message))
            .disable_notification(true)
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }

    async fn unpin_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.bot
            .unpin_chat_message(tg_chat(message.chat))
            .message_id(tg_message(message.message))
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> PlatformResult<MessageId> {
        let input = InputFile::memory(contents).file_name(file_name.to_string());
        let message = self
            .bot
            .send_document(tg_chat(chat), input)
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(MessageId(message.id.0))
    }
}

/// Build a media group from a burst, or `None` when some part cannot be
/// sent by file id.
fn media_group(unit: &BurstUnit) -> Option<Vec<InputMedia>> {
    let mut media = Vec::with_capacity(unit.parts.len());
    for (index, part) in unit.parts.iter().enumerate() {
        let file = InputFile::file_id(FileId(part.file_id.clone()?));
        let (caption, parse_mode) = match (index, &unit.caption) {
            (0, Some(caption)) => (Some(caption.clone()), Some(ParseMode::Html)),
            _ => (None, None),
        };
        let item = match part.kind {
            ContentKind::Photo => {
                let mut photo = InputMediaPhoto::new(file);
                photo.caption = caption;
                photo.parse_mode = parse_mode;
                InputMedia::Photo(photo)
            },
            ContentKind::Video => {
                let mut video = InputMediaVideo::new(file);
                video.caption = caption;
                video.parse_mode = parse_mode;
                InputMedia::Video(video)
            },
            ContentKind::Audio => {
                let mut audio = InputMediaAudio::new(file);
                audio.caption = caption;
                audio.parse_mode = parse_mode;
                InputMedia::Audio(audio)
            },
            ContentKind::Document => {
                let mut document = InputMediaDocument::new(file);
                document.caption = caption;
                document.parse_mode = parse_mode;
                InputMedia::Document(document)
            },
            ContentKind::Text | ContentKind::Other => return None,
        };
        media.push(item);
    }
    (!media.is_empty()).then_some(media)
}

pub(crate) fn tg_chat(chat: ChatId) -> TgChatId {
    TgChatId(chat.0)
}

pub(crate) fn tg_message(message: MessageId) -> TgMessageId {
    TgMessageId(message.0)
}

pub(crate) fn tg_thread(thread: ThreadId) -> TgThreadId {
    TgThreadId(TgMessageId(thread.0))
}

/// Map a Bot API failure onto the relay's error taxonomy.
pub fn classify_request_error(error: &RequestError) -> PlatformError {
    let classified = match error {
        RequestError::RetryAfter(wait) => PlatformError::RetryAfter(wait.duration()),
        RequestError::Api(ApiError::BotBlocked) => PlatformError::RecipientBlocked,
        RequestError::Api(api) => classify_api_description(&api.to_string()),
        RequestError::Network(_) | RequestError::Io(_) => {
            PlatformError::Transport(error.to_string())
        },
        other => PlatformError::Rejected(other.to_string()),
    };
    if matches!(classified, PlatformError::Rejected(_)) {
        warn!(error = %error, "unclassified telegram error");
    }
    classified
}

/// Classify the description text of an API error.
pub fn classify_api_description(description: &str) -> PlatformError {
    let text = description.to_lowercase();
    if text.contains("message thread not found") || text.contains("topic_deleted") {
        PlatformError::ThreadNotFound
    } else if text.contains("bot was blocked by the user")
        || text.contains("user is deactivated")
        || text.contains("bot can't initiate conversation")
    {
        PlatformError::RecipientBlocked
    } else if text.contains("not enough rights") || text.contains("have no rights") {
        PlatformError::InsufficientRights
    } else if text.contains("not a forum") {
        PlatformError::NotAForum
    } else if text.contains("message to delete not found")
        || text.contains("message to copy not found")
        || text.contains("message can't be deleted")
        || text.contains("message to unpin not found")
    {
        PlatformError::MessageGone
    } else {
        PlatformError::Rejected(description.to_string())
    }
}
