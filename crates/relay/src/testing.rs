//! Scripted in-process platform for tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    chrono::Utc,
    topicdesk_common::types::{
        ChatId, ContentUnit, Destination, MessageId, MessageRef, ThreadId, UserId,
    },
    topicdesk_directory::UserRecord,
};

use crate::{
    notice::{Notice, NoticeCatalog},
    platform::{Platform, PlatformError, PlatformResult},
};

pub fn user(id: i64, name: &str) -> UserRecord {
    UserRecord::new(UserId(id), name, None, Utc::now())
}

/// Renders notices as `<locale>:<Debug>` so tests can match on them.
pub struct EchoCatalog;

impl NoticeCatalog for EchoCatalog {
    fn render(&self, notice: &Notice, locale: &str) -> String {
        format!("{locale}:{notice:?}")
    }
}

#[derive(Debug, Clone)]
pub struct CreatedThread {
    pub title: String,
    pub icon: Option<String>,
    pub thread: ThreadId,
}

#[derive(Debug, Clone)]
pub struct SentText {
    pub id: MessageId,
    pub to: Destination,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct SentDocument {
    pub chat: ChatId,
    pub file_name: String,
    pub contents: Vec<u8>,
    pub caption: String,
}

#[derive(Default)]
struct State {
    next_thread: i32,
    next_message: i32,
    copy_failures: VecDeque<PlatformError>,
    thread_failures: VecDeque<PlatformError>,
    copies: Vec<(ContentUnit, Destination)>,
    copy_attempts: usize,
    threads: Vec<CreatedThread>,
    thread_attempts: usize,
    thread_delay: Duration,
    texts: Vec<SentText>,
    deleted: Vec<MessageRef>,
    pinned: Vec<MessageRef>,
    unpinned: Vec<MessageRef>,
    documents: Vec<SentDocument>,
}

/// Records every call. Failures queued with `fail_*` are returned by the
/// next calls of that kind, in order; everything else succeeds.
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_thread: 1000,
                next_message: 5000,
                ..State::default()
            }),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn fail_copy(&self, err: PlatformError) {
        self.with(|s| s.copy_failures.push_back(err));
    }

    pub fn fail_create_thread(&self, err: PlatformError) {
        self.with(|s| s.thread_failures.push_back(err));
    }

    /// Make topic creation take `delay` before it answers.
    pub fn delay_create_thread(&self, delay: Duration) {
        self.with(|s| s.thread_delay = delay);
    }

    pub fn copies(&self) -> Vec<(ContentUnit, Destination)> {
        self.with(|s| s.copies.clone())
    }

    pub fn copy_attempts(&self) -> usize {
        self.with(|s| s.copy_attempts)
    }

    pub fn created_threads(&self) -> Vec<CreatedThread> {
        self.with(|s| s.threads.clone())
    }

    pub fn create_thread_attempts(&self) -> usize {
        self.with(|s| s.thread_attempts)
    }

    pub fn texts(&self) -> Vec<SentText> {
        self.with(|s| s.texts.clone())
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.with(|s| s.deleted.clone())
    }

    pub fn pinned(&self) -> Vec<MessageRef> {
        self.with(|s| s.pinned.clone())
    }

    pub fn unpinned(&self) -> Vec<MessageRef> {
        self.with(|s| s.unpinned.clone())
    }

    pub fn documents(&self) -> Vec<SentDocument> {
        self.with(|s| s.documents.clone())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn copy(&self, unit: &ContentUnit, to: Destination) -> PlatformResult<Vec<MessageId>> {
        self.with(|s| {
            s.copy_attempts += 1;
            if let Some(err) = s.copy_failures.pop_front() {
                return Err(err);
            }
            s.copies.push((unit.clone(), to));
            let ids = (0..unit.part_count())
                .map(|_| {
                    s.next_message += 1;
                    MessageId(s.next_message)
                })
                .collect();
            Ok(ids)
        })
    }

    async fn create_thread(
        &self,
        _chat: ChatId,
        title: &str,
        icon_emoji_id: Option<&str>,
    ) -> PlatformResult<ThreadId> {
        let delay = self.with(|s| s.thread_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            s.thread_attempts += 1;
            if let Some(err) = s.thread_failures.pop_front() {
                return Err(err);
            }
            s.next_thread += 1;
            let thread = ThreadId(s.next_thread);
            s.threads.push(CreatedThread {
                title: title.to_string(),
                icon: icon_emoji_id.map(String::from),
                thread,
            });
            Ok(thread)
        })
    }

    async fn send_text(
        &self,
        to: Destination,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> PlatformResult<MessageId> {
        self.with(|s| {
            s.next_message += 1;
            let id = MessageId(s.next_message);
            s.texts.push(SentText {
                id,
                to,
                text: text.to_string(),
                reply_to,
            });
            Ok(id)
        })
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.with(|s| s.deleted.push(message));
        Ok(())
    }

    async fn pin_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.with(|s| s.pinned.push(message));
        Ok(())
    }

    async fn unpin_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.with(|s| s.unpinned.push(message));
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> PlatformResult<MessageId> {
        self.with(|s| {
            s.next_message += 1;
            s.documents.push(SentDocument {
                chat,
                file_name: file_name.to_string(),
                contents,
                caption: caption.to_string(),
            });
            Ok(MessageId(s.next_message))
        })
    }
}
