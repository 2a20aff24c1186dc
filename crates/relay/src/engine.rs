//! The relay pipeline.
//!
//! Every inbound event goes through the same steps: debounce and coalesce,
//! resolve the identity on the other side, copy, acknowledge. Topics are
//! provisioned lazily on a user's first relayed message and re-provisioned
//! once when the platform reports the stored one gone.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    chrono::Utc,
    dashmap::DashMap,
    tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    topicdesk_common::types::{
        ChatId, ContentUnit, Destination, MessageId, MessageRef, ThreadId, UserId,
    },
    topicdesk_config::TopicdeskConfig,
    topicdesk_directory::{DirectoryStore, MembershipState, UserRecord},
    tracing::{debug, error, info, instrument, warn},
};

use crate::{
    ack::Acknowledger,
    album::{AlbumSettings, BurstAggregator, Offer},
    error::{Error, Result},
    event::{InboundEvent, InboundMessage, Profile, RelayOutcome, StaffCommand},
    notice::{Notice, NoticeCatalog},
    platform::{Platform, PlatformError},
    provision::ThreadProvisioner,
    report::AdminReporter,
    throttle::{DEFAULT_BUCKET, DebounceGate},
};

/// Runtime settings of the engine, derived from the loaded config.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// The forum group holding one topic per user.
    pub group: ChatId,
    /// Receives escalated failures.
    pub operator: ChatId,
    pub topic_icon_emoji_id: Option<String>,
    pub languages: Vec<String>,
    pub default_language: String,
    pub ack_delete_after: Duration,
    pub greeting_delay: Duration,
    pub album: AlbumSettings,
    pub default_throttle: Duration,
    pub throttle_buckets: HashMap<String, Duration>,
}

impl RelaySettings {
    pub fn from_config(config: &TopicdeskConfig) -> Self {
        let relay = &config.relay;
        Self {
            group: ChatId(config.bot.group_id),
            operator: ChatId(config.bot.dev_id),
            topic_icon_emoji_id: config.bot.topic_icon_emoji_id.clone(),
            languages: config.i18n.languages.clone(),
            default_language: config.i18n.default_language.clone(),
            ack_delete_after: Duration::from_secs(relay.ack_delete_after_secs),
            greeting_delay: Duration::from_secs(relay.greeting_delay_secs),
            album: AlbumSettings {
                latency: Duration::from_millis(relay.album_latency_ms),
                ttl: Duration::from_millis(relay.album_ttl_ms),
                capacity: relay.album_capacity,
            },
            default_throttle: Duration::from_millis(relay.default_throttle_ms),
            throttle_buckets: relay
                .throttle_buckets
                .iter()
                .map(|(name, ms)| (name.clone(), Duration::from_millis(*ms)))
                .collect(),
        }
    }

    pub fn is_enabled(&self, locale: &str) -> bool {
        self.languages.iter().any(|l| l == locale)
    }
}

enum Gathered {
    Unit(ContentUnit),
    Settled(RelayOutcome),
}

type IdentityLocks = DashMap<UserId, Arc<AsyncMutex<()>>>;

/// Exclusive access to one user's record. The map entry is dropped with the
/// last holder.
struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    user: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct RelayEngine {
    settings: RelaySettings,
    platform: Arc<dyn Platform>,
    directory: Arc<dyn DirectoryStore>,
    catalog: Arc<dyn NoticeCatalog>,
    provisioner: ThreadProvisioner,
    aggregator: BurstAggregator,
    gate: DebounceGate,
    acks: Acknowledger,
    reporter: AdminReporter,
    /// Serializes read-modify-write of each user's record, topic
    /// provisioning included.
    identity_locks: IdentityLocks,
}

impl RelayEngine {
    pub fn new(
        settings: RelaySettings,
        platform: Arc<dyn Platform>,
        directory: Arc<dyn DirectoryStore>,
        catalog: Arc<dyn NoticeCatalog>,
    ) -> Self {
        let provisioner = ThreadProvisioner::new(
            Arc::clone(&platform),
            settings.group,
            settings.topic_icon_emoji_id.clone(),
        );
        Self {
            provisioner,
            aggregator: BurstAggregator::new(settings.album),
            gate: DebounceGate::new(settings.default_throttle, settings.throttle_buckets.clone()),
            acks: Acknowledger::new(Arc::clone(&platform), settings.ack_delete_after),
            reporter: AdminReporter::new(Arc::clone(&platform), settings.operator),
            identity_locks: DashMap::new(),
            settings,
            platform,
            directory,
            catalog,
        }
    }

    /// Replace the debounce gate built from the settings.
    #[must_use]
    pub fn with_gate(mut self, gate: DebounceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn reporter(&self) -> &AdminReporter {
        &self.reporter
    }

    /// Debounce check for actions handled outside the engine.
    #[must_use]
    pub fn admit(&self, user: UserId, bucket: &str) -> bool {
        self.gate.admit(user, bucket)
    }

    /// Process one inbound event to its outcome.
    ///
    /// Failures of a relay attempt are escalated, acknowledged as not sent
    /// and reported as [`RelayOutcome::Failed`]. Failures of any other event
    /// are escalated and returned.
    #[instrument(skip_all, fields(event = event.name()))]
    pub async fn handle(&self, event: InboundEvent) -> Result<RelayOutcome> {
        let result = match &event {
            InboundEvent::Private { profile, message } => self.on_private(profile, message).await,
            InboundEvent::PrivateEdited { profile, message } => {
                self.on_private_edit(profile, *message).await
            },
            InboundEvent::Staff {
                sender,
                thread,
                message,
            } => self.on_staff(*sender, *thread, message).await,
            InboundEvent::StaffCommand {
                sender,
                thread,
                command,
                message,
            } => {
                self.on_staff_command(*sender, *thread, *command, *message)
                    .await
            },
            InboundEvent::ThreadCreated { thread } => self.greet_thread(*thread).await,
            InboundEvent::Membership { profile, state } => {
                self.set_membership(profile, *state).await
            },
            InboundEvent::LocaleChosen { profile, locale } => {
                self.set_locale(profile, locale).await
            },
        };

        let err = match result {
            Ok(outcome) => {
                debug!(?outcome, "event handled");
                return Ok(outcome);
            },
            Err(err) => err,
        };

        if is_routine(&err) {
            warn!(error = %err, "relay attempt failed");
        } else {
            self.escalate(&event, &err).await;
        }

        match &event {
            InboundEvent::Private { profile, message } => {
                let locale = self.stored_locale(profile).await;
                self.notify_user(&locale, message.origin(), Notice::MessageNotSent)
                    .await;
                Ok(RelayOutcome::Failed)
            },
            InboundEvent::Staff {
                thread, message, ..
            } => {
                self.notify_staff(*thread, message.origin(), Notice::MessageNotSent)
                    .await;
                Ok(RelayOutcome::Failed)
            },
            _ => Err(err),
        }
    }

    async fn on_private(
        &self,
        profile: &Profile,
        message: &InboundMessage,
    ) -> Result<RelayOutcome> {
        let unit = match self.gather(profile.user, message).await {
            Gathered::Unit(unit) => unit,
            Gathered::Settled(outcome) => return Ok(outcome),
        };
        let origin = unit.origin().unwrap_or(message.origin());

        let _identity = self.lock_identity(profile.user).await;
        let mut user = self.load_identity(profile).await?;
        self.directory.upsert(&user).await?;
        let outcome = if user.is_blocked {
            info!(user_id = %user.id, "not relaying message from blocked user");
            RelayOutcome::Blocked
        } else {
            self.relay_to_staff(&mut user, &unit).await?
        };

        let notice = match outcome {
            RelayOutcome::Delivered => Notice::MessageSent,
            RelayOutcome::Blocked => Notice::MessageRejected,
            _ => Notice::MessageNotSent,
        };
        let locale = self.locale_for(&user, Some(profile));
        self.notify_user(&locale, origin, notice).await;
        Ok(outcome)
    }

    async fn on_private_edit(&self, profile: &Profile, message: MessageRef) -> Result<RelayOutcome> {
        let user = self.resolve_identity(profile).await?;
        let locale = self.locale_for(&user, Some(profile));
        self.notify_user(&locale, message, Notice::MessageEdited)
            .await;
        Ok(RelayOutcome::Ignored)
    }

    async fn on_staff(
        &self,
        sender: UserId,
        thread: ThreadId,
        message: &InboundMessage,
    ) -> Result<RelayOutcome> {
        let unit = match self.gather(sender, message).await {
            Gathered::Unit(unit) => unit,
            Gathered::Settled(outcome) => return Ok(outcome),
        };
        let origin = unit.origin().unwrap_or(message.origin());

        let Some((_identity, mut user)) = self.lock_thread_owner(thread).await? else {
            debug!(thread_id = %thread, "no user owns this topic");
            return Ok(RelayOutcome::UnknownThread);
        };
        user.updated_at = Utc::now();
        self.directory.upsert(&user).await?;

        let (outcome, notice) = if user.silent_mode {
            debug!(user_id = %user.id, "silent mode, holding back staff reply");
            (RelayOutcome::SilentSuppressed, Notice::SilentSuppressed)
        } else {
            self.relay_to_user(&user, &unit).await?
        };
        self.notify_staff(thread, origin, notice).await;
        Ok(outcome)
    }

    async fn on_staff_command(
        &self,
        sender: UserId,
        thread: ThreadId,
        command: StaffCommand,
        message: MessageRef,
    ) -> Result<RelayOutcome> {
        if !self.gate.admit(sender, DEFAULT_BUCKET) {
            return Ok(self.debounced(message).await);
        }
        match command {
            StaffCommand::Ban => self.toggle_block(thread, message.message).await,
            StaffCommand::Silent => self.toggle_silent(thread, message.message).await,
            StaffCommand::Information => self.describe(thread, message.message).await,
        }
    }

    /// Run a message through the debounce gate and the burst aggregator.
    async fn gather(&self, identity: UserId, message: &InboundMessage) -> Gathered {
        match &message.burst_id {
            Some(burst) => {
                let offer = self
                    .aggregator
                    .offer(
                        burst.clone(),
                        message.part.clone(),
                        message.caption.clone(),
                        || self.gate.admit(identity, DEFAULT_BUCKET),
                    )
                    .await;
                match offer {
                    Offer::Flushed(unit) => Gathered::Unit(ContentUnit::Burst(unit)),
                    Offer::Joined => Gathered::Settled(RelayOutcome::Coalesced),
                    Offer::Refused => Gathered::Settled(self.debounced(message.origin()).await),
                }
            },
            None if self.gate.admit(identity, DEFAULT_BUCKET) => {
                Gathered::Unit(ContentUnit::Single(message.part.clone()))
            },
            None => Gathered::Settled(self.debounced(message.origin()).await),
        }
    }

    async fn debounced(&self, message: MessageRef) -> RelayOutcome {
        if let Err(e) = self.platform.delete_message(message).await {
            debug!(chat_id = %message.chat, error = %e, "could not remove debounced message");
        }
        RelayOutcome::Debounced
    }

    /// Load or create the record for `profile` and refresh its profile
    /// fields. Nothing is written.
    async fn load_identity(&self, profile: &Profile) -> Result<UserRecord> {
        let now = Utc::now();
        let mut user = match self.directory.get(profile.user).await? {
            Some(mut user) => {
                if user.refresh_profile(&profile.display_name, profile.handle_name.clone()) {
                    debug!(user_id = %user.id, "profile changed");
                }
                user
            },
            None => {
                info!(user_id = %profile.user, "first contact");
                UserRecord::new(
                    profile.user,
                    &profile.display_name,
                    profile.handle_name.clone(),
                    now,
                )
            },
        };
        if user.locale.is_none()
            && let [only] = self.settings.languages.as_slice()
        {
            user.locale = Some(only.clone());
        }
        user.updated_at = now;
        Ok(user)
    }

    /// Load or create the record for `profile`, refresh it and persist it.
    pub async fn resolve_identity(&self, profile: &Profile) -> Result<UserRecord> {
        let _identity = self.lock_identity(profile.user).await;
        let user = self.load_identity(profile).await?;
        self.directory.upsert(&user).await?;
        Ok(user)
    }

    async fn lock_identity(&self, user: UserId) -> IdentityGuard<'_> {
        let lock = self.identity_locks.entry(user).or_default().value().clone();
        let guard = lock.lock_owned().await;
        IdentityGuard {
            locks: &self.identity_locks,
            user,
            guard: Some(guard),
        }
    }

    /// Lock the user owning `thread` and read their record under the lock.
    async fn lock_thread_owner(
        &self,
        thread: ThreadId,
    ) -> Result<Option<(IdentityGuard<'_>, UserRecord)>> {
        let Some(owner) = self.directory.lookup_by_thread(thread).await? else {
            return Ok(None);
        };
        let guard = self.lock_identity(owner.id).await;
        match self.directory.get(owner.id).await? {
            Some(user) if user.thread == Some(thread) => Ok(Some((guard, user))),
            _ => Ok(None),
        }
    }

    /// The user's topic, provisioning one if there is none.
    ///
    /// `stale` names a topic the platform reported gone: the stored handle is
    /// cleared and a new topic created. Callers hold the identity lock, so
    /// `user` is the current record.
    async fn resolve_thread(
        &self,
        user: &mut UserRecord,
        stale: Option<ThreadId>,
    ) -> Result<ThreadId> {
        if let Some(thread) = user.thread
            && Some(thread) != stale
        {
            return Ok(thread);
        }

        if stale.is_some() {
            user.thread = None;
            user.updated_at = Utc::now();
            self.directory.upsert(user).await?;
        }

        let thread = self.provisioner.provision(user).await?;
        user.thread = Some(thread);
        user.updated_at = Utc::now();
        self.directory.upsert(user).await?;
        Ok(thread)
    }

    async fn relay_to_staff(
        &self,
        user: &mut UserRecord,
        unit: &ContentUnit,
    ) -> Result<RelayOutcome> {
        let thread = self.resolve_thread(user, None).await?;
        match self
            .platform
            .copy(unit, Destination::thread(self.settings.group, thread))
            .await
        {
            Ok(_) => return Ok(RelayOutcome::Delivered),
            Err(PlatformError::ThreadNotFound) => {
                warn!(user_id = %user.id, thread_id = %thread, "topic is gone, provisioning a new one");
            },
            Err(e) => return Err(e.into()),
        }

        let thread = self.resolve_thread(user, Some(thread)).await?;
        self.platform
            .copy(unit, Destination::thread(self.settings.group, thread))
            .await?;
        info!(user_id = %user.id, thread_id = %thread, "relayed after topic repair");
        Ok(RelayOutcome::Delivered)
    }

    async fn relay_to_user(
        &self,
        user: &UserRecord,
        unit: &ContentUnit,
    ) -> Result<(RelayOutcome, Notice)> {
        match self
            .platform
            .copy(unit, Destination::chat(user.id.into()))
            .await
        {
            Ok(_) => Ok((RelayOutcome::Delivered, Notice::MessageSentToUser)),
            Err(PlatformError::RecipientBlocked) => {
                info!(user_id = %user.id, "user has blocked the bot");
                Ok((RelayOutcome::RecipientBlocked, Notice::BlockedByUser))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Flip the block flag of the user owning `thread`.
    pub async fn toggle_block(&self, thread: ThreadId, reply_to: MessageId) -> Result<RelayOutcome> {
        let Some((_identity, mut user)) = self.lock_thread_owner(thread).await? else {
            return Ok(RelayOutcome::UnknownThread);
        };
        user.is_blocked = !user.is_blocked;
        user.updated_at = Utc::now();
        self.directory.upsert(&user).await?;
        info!(user_id = %user.id, blocked = user.is_blocked, "block toggled");

        let notice = if user.is_blocked {
            Notice::UserBlocked
        } else {
            Notice::UserUnblocked
        };
        self.reply_in_thread(thread, reply_to, &notice).await?;
        Ok(RelayOutcome::Applied)
    }

    /// Flip silent mode of the topic. Enabling pins the reply as a marker;
    /// disabling unpins it again.
    pub async fn toggle_silent(&self, thread: ThreadId, reply_to: MessageId) -> Result<RelayOutcome> {
        let Some((_identity, mut user)) = self.lock_thread_owner(thread).await? else {
            return Ok(RelayOutcome::UnknownThread);
        };
        let group = self.settings.group;

        if user.silent_mode {
            if let Some(marker) = user.silent_marker.take()
                && let Err(e) = self
                    .platform
                    .unpin_message(MessageRef::new(group, marker))
                    .await
            {
                warn!(thread_id = %thread, error = %e, "failed to unpin silent mode marker");
            }
            user.silent_mode = false;
            self.reply_in_thread(thread, reply_to, &Notice::SilentDisabled)
                .await?;
        } else {
            let marker = self
                .reply_in_thread(thread, reply_to, &Notice::SilentEnabled)
                .await?;
            if let Err(e) = self
                .platform
                .pin_message(MessageRef::new(group, marker))
                .await
            {
                warn!(thread_id = %thread, error = %e, "failed to pin silent mode marker");
            }
            user.silent_mode = true;
            user.silent_marker = Some(marker);
        }

        user.updated_at = Utc::now();
        self.directory.upsert(&user).await?;
        info!(user_id = %user.id, silent = user.silent_mode, "silent mode toggled");
        Ok(RelayOutcome::Applied)
    }

    /// Post the identity card of the user owning `thread`.
    pub async fn describe(&self, thread: ThreadId, reply_to: MessageId) -> Result<RelayOutcome> {
        let Some(user) = self.directory.lookup_by_thread(thread).await? else {
            return Ok(RelayOutcome::UnknownThread);
        };
        let notice = Notice::UserInformation {
            id: user.id,
            name: user.display_name.clone(),
            handle: user.handle_label(),
        };
        self.reply_in_thread(thread, reply_to, &notice).await?;
        Ok(RelayOutcome::Applied)
    }

    /// Post and pin the greeting card in a freshly created topic.
    ///
    /// Waits first so that the provisioning task has persisted the topic.
    pub async fn greet_thread(&self, thread: ThreadId) -> Result<RelayOutcome> {
        tokio::time::sleep(self.settings.greeting_delay).await;
        let Some(user) = self.directory.lookup_by_thread(thread).await? else {
            debug!(thread_id = %thread, "topic created for no known user");
            return Ok(RelayOutcome::UnknownThread);
        };

        let notice = Notice::UserStarted {
            name: user.display_name.clone(),
            url: user.profile_url(),
        };
        let text = self.catalog.render(&notice, &self.settings.default_language);
        let group = self.settings.group;
        let card = self
            .platform
            .send_text(Destination::thread(group, thread), &text, None)
            .await?;
        if let Err(e) = self.platform.pin_message(MessageRef::new(group, card)).await {
            warn!(thread_id = %thread, error = %e, "failed to pin greeting");
        }
        Ok(RelayOutcome::Applied)
    }

    /// Record that the user started or stopped the bot and tell the staff.
    pub async fn set_membership(
        &self,
        profile: &Profile,
        state: MembershipState,
    ) -> Result<RelayOutcome> {
        let _identity = self.lock_identity(profile.user).await;
        let mut user = self.load_identity(profile).await?;
        user.membership = state;
        self.directory.upsert(&user).await?;
        info!(user_id = %user.id, membership = %state, "membership changed");

        if let Some(thread) = user.thread {
            let name = user.display_name.clone();
            let url = user.profile_url();
            let notice = match state {
                MembershipState::Active => Notice::UserRestarted { name, url },
                MembershipState::Stopped => Notice::UserStopped { name, url },
            };
            let text = self.catalog.render(&notice, &self.settings.default_language);
            self.platform
                .send_text(Destination::thread(self.settings.group, thread), &text, None)
                .await?;
        }
        Ok(RelayOutcome::Applied)
    }

    /// Store the user's language choice. Unknown locales are ignored.
    pub async fn set_locale(&self, profile: &Profile, locale: &str) -> Result<RelayOutcome> {
        if !self.settings.is_enabled(locale) {
            warn!(user_id = %profile.user, locale, "ignoring unsupported locale");
            return Ok(RelayOutcome::Ignored);
        }
        let _identity = self.lock_identity(profile.user).await;
        let mut user = self.load_identity(profile).await?;
        user.locale = Some(locale.to_string());
        self.directory.upsert(&user).await?;
        debug!(user_id = %user.id, locale, "locale set");
        Ok(RelayOutcome::Applied)
    }

    /// Locale to address `user` in: their choice, then the client language,
    /// then the default.
    pub fn locale_for(&self, user: &UserRecord, profile: Option<&Profile>) -> String {
        user.locale
            .as_deref()
            .filter(|l| self.settings.is_enabled(l))
            .or_else(|| {
                profile
                    .and_then(|p| p.language_code.as_deref())
                    .filter(|l| self.settings.is_enabled(l))
            })
            .unwrap_or(&self.settings.default_language)
            .to_string()
    }

    async fn stored_locale(&self, profile: &Profile) -> String {
        match self.directory.get(profile.user).await {
            Ok(Some(user)) => self.locale_for(&user, Some(profile)),
            _ => profile
                .language_code
                .as_deref()
                .filter(|l| self.settings.is_enabled(l))
                .unwrap_or(&self.settings.default_language)
                .to_string(),
        }
    }

    async fn notify_user(&self, locale: &str, origin: MessageRef, notice: Notice) {
        let text = self.catalog.render(&notice, locale);
        self.acks
            .send(Destination::chat(origin.chat), Some(origin.message), &text)
            .await;
    }

    async fn notify_staff(&self, thread: ThreadId, origin: MessageRef, notice: Notice) {
        let text = self.catalog.render(&notice, &self.settings.default_language);
        self.acks
            .send(
                Destination::thread(self.settings.group, thread),
                Some(origin.message),
                &text,
            )
            .await;
    }

    async fn reply_in_thread(
        &self,
        thread: ThreadId,
        reply_to: MessageId,
        notice: &Notice,
    ) -> Result<MessageId> {
        let text = self.catalog.render(notice, &self.settings.default_language);
        let id = self
            .platform
            .send_text(
                Destination::thread(self.settings.group, thread),
                &text,
                Some(reply_to),
            )
            .await?;
        Ok(id)
    }

    async fn escalate(&self, event: &InboundEvent, err: &Error) {
        error!(error = %err, kind = err.kind(), "escalating failure to operator");
        match err {
            Error::Provision(provision) => self.reporter.report_provision(provision).await,
            other => {
                let payload = serde_json::to_string_pretty(event)
                    .unwrap_or_else(|e| format!("unserializable event: {e}"));
                let label = format!("{}_{}", event.name(), Utc::now().timestamp_millis());
                self.reporter.report_failure(&label, other, &payload).await;
            },
        }
    }
}

/// Failures that end a relay attempt without bothering the operator.
fn is_routine(err: &Error) -> bool {
    matches!(
        err,
        Error::Platform(PlatformError::RetryAfter(_) | PlatformError::MessageGone)
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{EchoCatalog, FakePlatform, user},
        topicdesk_common::types::{BurstId, ContentKind, ContentPart},
        topicdesk_directory::InMemoryDirectory,
    };

    const GROUP: ChatId = ChatId(-100);
    const OPERATOR: ChatId = ChatId(42);

    struct Harness {
        engine: Arc<RelayEngine>,
        platform: Arc<FakePlatform>,
        directory: Arc<InMemoryDirectory>,
    }

    fn settings() -> RelaySettings {
        let mut config = TopicdeskConfig::default();
        config.bot.group_id = GROUP.0;
        config.bot.dev_id = OPERATOR.0;
        RelaySettings::from_config(&config)
    }

    fn harness_with(records: Vec<UserRecord>, gate: Option<DebounceGate>) -> Harness {
        let platform = FakePlatform::shared();
        let directory = Arc::new(InMemoryDirectory::with_records(records));
        let mut engine = RelayEngine::new(
            settings(),
            platform.clone(),
            directory.clone(),
            Arc::new(EchoCatalog),
        );
        if let Some(gate) = gate {
            engine = engine.with_gate(gate);
        }
        Harness {
            engine: Arc::new(engine),
            platform,
            directory,
        }
    }

    fn harness(records: Vec<UserRecord>) -> Harness {
        harness_with(records, None)
    }

    fn seeded(id: i64, thread: i32) -> UserRecord {
        let mut record = user(id, "Ann");
        record.thread = Some(ThreadId(thread));
        record
    }

    fn profile(id: i64) -> Profile {
        Profile::new(UserId(id), "Ann")
    }

    fn text_from(chat: ChatId, message: i32) -> InboundMessage {
        InboundMessage::single(ContentPart::new(
            ContentKind::Text,
            None,
            MessageRef::new(chat, MessageId(message)),
        ))
    }

    fn private(id: i64, message: i32) -> InboundEvent {
        InboundEvent::Private {
            profile: profile(id),
            message: text_from(ChatId(id), message),
        }
    }

    fn private_photo(id: i64, message: i32, burst: &str) -> InboundEvent {
        InboundEvent::Private {
            profile: profile(id),
            message: InboundMessage {
                part: ContentPart::new(
                    ContentKind::Photo,
                    Some(format!("photo-{message}")),
                    MessageRef::new(ChatId(id), MessageId(message)),
                ),
                burst_id: Some(BurstId::new(burst)),
                caption: None,
            },
        }
    }

    fn staff(thread: i32, message: i32) -> InboundEvent {
        InboundEvent::Staff {
            sender: UserId(900),
            thread: ThreadId(thread),
            message: text_from(GROUP, message),
        }
    }

    fn command(thread: i32, command: StaffCommand, message: i32) -> InboundEvent {
        InboundEvent::StaffCommand {
            sender: UserId(900),
            thread: ThreadId(thread),
            command,
            message: MessageRef::new(GROUP, MessageId(message)),
        }
    }

    async fn stored(h: &Harness, id: i64) -> UserRecord {
        h.directory.get(UserId(id)).await.unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn album_becomes_one_topic_and_one_copy() {
        let h = harness(vec![]);
        let tasks: Vec<_> = (1..=3)
            .map(|n| {
                let engine = Arc::clone(&h.engine);
                let event = private_photo(7, n, "B1");
                tokio::spawn(async move { engine.handle(event).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                RelayOutcome::Delivered,
                RelayOutcome::Coalesced,
                RelayOutcome::Coalesced
            ]
        );

        let created = h.platform.created_threads();
        assert_eq!(created.len(), 1);
        let copies = h.platform.copies();
        assert_eq!(copies.len(), 1);
        let (unit, to) = &copies[0];
        assert_eq!(unit.part_count(), 3);
        assert_eq!(*to, Destination::thread(GROUP, created[0].thread));
        assert_eq!(stored(&h, 7).await.thread, Some(created[0].thread));

        let acks = h.platform.texts();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].text, "en:MessageSent");
        assert_eq!(acks[0].reply_to, Some(MessageId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn known_topic_is_reused() {
        let h = harness(vec![seeded(9, 55)]);

        for message in 1..=2 {
            let outcome = h.engine.handle(private(9, message)).await.unwrap();
            assert_eq!(outcome, RelayOutcome::Delivered);
            tokio::time::advance(Duration::from_secs(5)).await;
        }

        assert!(h.platform.created_threads().is_empty());
        let copies = h.platform.copies();
        assert_eq!(copies.len(), 2);
        assert!(
            copies
                .iter()
                .all(|(_, to)| *to == Destination::thread(GROUP, ThreadId(55)))
        );
        assert_eq!(stored(&h, 9).await.thread, Some(ThreadId(55)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_topic_still_receives_user_messages() {
        let mut record = seeded(9, 55);
        record.silent_mode = true;
        let h = harness(vec![record]);

        let outcome = h.engine.handle(private(9, 1)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Delivered);
        assert!(h.platform.created_threads().is_empty());
        let copies = h.platform.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].1, Destination::thread(GROUP, ThreadId(55)));
        let acks = h.platform.texts();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].text, "en:MessageSent");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_topic_is_repaired_once() {
        let h = harness(vec![seeded(8, 55)]);
        h.platform.fail_copy(PlatformError::ThreadNotFound);

        let outcome = h.engine.handle(private(8, 1)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Delivered);
        assert_eq!(h.platform.copy_attempts(), 2);
        let created = h.platform.created_threads();
        assert_eq!(created.len(), 1);
        assert_eq!(stored(&h, 8).await.thread, Some(created[0].thread));
        assert_eq!(
            h.platform.copies()[0].1,
            Destination::thread(GROUP, created[0].thread)
        );
        assert!(
            h.directory
                .lookup_by_thread(ThreadId(55))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_stale_failure_is_escalated() {
        let h = harness(vec![seeded(8, 55)]);
        h.platform.fail_copy(PlatformError::ThreadNotFound);
        h.platform.fail_copy(PlatformError::ThreadNotFound);

        let outcome = h.engine.handle(private(8, 1)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Failed);
        assert_eq!(h.platform.copy_attempts(), 2);
        assert_eq!(h.platform.created_threads().len(), 1);
        let docs = h.platform.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].chat, OPERATOR);
        assert!(docs[0].file_name.starts_with("error_private_"));
        assert!(
            h.platform
                .texts()
                .iter()
                .any(|t| t.text == "en:MessageNotSent" && t.to == Destination::chat(ChatId(8)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn double_trigger_is_debounced() {
        let h = harness(vec![seeded(3, 55)]);

        let first = h.engine.handle(private(3, 1)).await.unwrap();
        let second = h.engine.handle(private(3, 2)).await.unwrap();

        assert_eq!(first, RelayOutcome::Delivered);
        assert_eq!(second, RelayOutcome::Debounced);
        assert_eq!(h.platform.copies().len(), 1);
        assert!(
            h.platform
                .deleted()
                .contains(&MessageRef::new(ChatId(3), MessageId(2)))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        let third = h.engine.handle(private(3, 3)).await.unwrap();
        assert_eq!(third, RelayOutcome::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_user_is_not_relayed() {
        let mut record = seeded(5, 55);
        record.is_blocked = true;
        let h = harness(vec![record]);

        let outcome = h.engine.handle(private(5, 1)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Blocked);
        assert_eq!(h.platform.copy_attempts(), 0);
        assert!(h.platform.created_threads().is_empty());
        let acks = h.platform.texts();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].text, "en:MessageRejected");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_first_messages_provision_once() {
        let h = harness_with(vec![], Some(DebounceGate::new(Duration::ZERO, HashMap::new())));
        h.platform.delay_create_thread(Duration::from_millis(50));

        let a = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.handle(private(11, 1)).await })
        };
        let b = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.handle(private(11, 2)).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), RelayOutcome::Delivered);
        assert_eq!(b.await.unwrap().unwrap(), RelayOutcome::Delivered);
        let created = h.platform.created_threads();
        assert_eq!(created.len(), 1);
        let copies = h.platform.copies();
        assert_eq!(copies.len(), 2);
        assert!(
            copies
                .iter()
                .all(|(_, to)| *to == Destination::thread(GROUP, created[0].thread))
        );
        assert!(h.engine.identity_locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_failure_reaches_operator() {
        let h = harness(vec![]);
        h.platform
            .fail_create_thread(PlatformError::InsufficientRights);

        let outcome = h.engine.handle(private(12, 1)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Failed);
        let texts = h.platform.texts();
        assert!(texts.iter().any(|t| {
            t.to == Destination::chat(OPERATOR)
                && t.text == "The bot doesn't have sufficient rights to create a forum topic."
        }));
        assert!(texts.iter().any(|t| t.text == "en:MessageNotSent"));
        assert_eq!(stored(&h, 12).await.thread, None);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_is_refreshed_on_contact() {
        let h = harness(vec![seeded(6, 55)]);
        let event = InboundEvent::Private {
            profile: Profile {
                user: UserId(6),
                display_name: "Annie".into(),
                handle_name: Some("@annie".into()),
                language_code: None,
            },
            message: text_from(ChatId(6), 1),
        };

        h.engine.handle(event).await.unwrap();

        let record = stored(&h, 6).await;
        assert_eq!(record.display_name, "Annie");
        assert_eq!(record.handle_name.as_deref(), Some("annie"));
        assert_eq!(record.thread, Some(ThreadId(55)));
    }

    #[tokio::test(start_paused = true)]
    async fn staff_reply_reaches_user() {
        let h = harness(vec![seeded(8, 55)]);

        let outcome = h.engine.handle(staff(55, 10)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::Delivered);
        assert_eq!(h.platform.copies()[0].1, Destination::chat(ChatId(8)));
        let acks = h.platform.texts();
        assert_eq!(acks[0].text, "en:MessageSentToUser");
        assert_eq!(acks[0].to, Destination::thread(GROUP, ThreadId(55)));
        assert_eq!(acks[0].reply_to, Some(MessageId(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_mode_holds_back_staff_replies() {
        let mut record = seeded(8, 55);
        record.silent_mode = true;
        let h = harness(vec![record]);

        let outcome = h.engine.handle(staff(55, 10)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::SilentSuppressed);
        assert_eq!(h.platform.copy_attempts(), 0);
        assert_eq!(h.platform.texts()[0].text, "en:SilentSuppressed");
    }

    #[tokio::test(start_paused = true)]
    async fn recipient_block_is_reported_to_staff() {
        let h = harness(vec![seeded(8, 55)]);
        h.platform.fail_copy(PlatformError::RecipientBlocked);

        let outcome = h.engine.handle(staff(55, 10)).await.unwrap();

        assert_eq!(outcome, RelayOutcome::RecipientBlocked);
        assert_eq!(h.platform.texts()[0].text, "en:BlockedByUser");
        assert!(h.platform.documents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn staff_message_in_unknown_topic() {
        let h = harness(vec![seeded(8, 55)]);
        let outcome = h.engine.handle(staff(999, 10)).await.unwrap();
        assert_eq!(outcome, RelayOutcome::UnknownThread);
        assert_eq!(h.platform.copy_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ban_toggles_block_flag() {
        let h = harness(vec![seeded(8, 55)]);

        let outcome = h
            .engine
            .handle(command(55, StaffCommand::Ban, 20))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Applied);
        assert!(stored(&h, 8).await.is_blocked);

        tokio::time::advance(Duration::from_secs(1)).await;
        h.engine
            .handle(command(55, StaffCommand::Ban, 21))
            .await
            .unwrap();
        assert!(!stored(&h, 8).await.is_blocked);

        let texts: Vec<_> = h.platform.texts().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["en:UserBlocked", "en:UserUnblocked"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_mode_pins_and_unpins_marker() {
        let h = harness(vec![seeded(8, 55)]);

        h.engine
            .handle(command(55, StaffCommand::Silent, 20))
            .await
            .unwrap();
        let record = stored(&h, 8).await;
        assert!(record.silent_mode);
        let marker = record.silent_marker.unwrap();
        assert_eq!(h.platform.pinned(), vec![MessageRef::new(GROUP, marker)]);

        tokio::time::advance(Duration::from_secs(1)).await;
        h.engine
            .handle(command(55, StaffCommand::Silent, 21))
            .await
            .unwrap();
        let record = stored(&h, 8).await;
        assert!(!record.silent_mode);
        assert_eq!(record.silent_marker, None);
        assert_eq!(h.platform.unpinned(), vec![MessageRef::new(GROUP, marker)]);
    }

    #[tokio::test(start_paused = true)]
    async fn information_card_names_the_user() {
        let mut record = seeded(8, 55);
        record.handle_name = Some("ann".into());
        let h = harness(vec![record]);

        h.engine
            .handle(command(55, StaffCommand::Information, 20))
            .await
            .unwrap();

        let texts = h.platform.texts();
        assert_eq!(
            texts[0].text,
            "en:UserInformation { id: UserId(8), name: \"Ann\", handle: \"@ann\" }"
        );
        assert_eq!(texts[0].reply_to, Some(MessageId(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_topic_gets_pinned_greeting() {
        let h = harness(vec![seeded(8, 55)]);

        let outcome = h
            .engine
            .handle(InboundEvent::ThreadCreated {
                thread: ThreadId(55),
            })
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Applied);
        let texts = h.platform.texts();
        assert_eq!(
            texts[0].text,
            "en:UserStarted { name: \"Ann\", url: \"tg://user?id=8\" }"
        );
        assert_eq!(texts[0].to, Destination::thread(GROUP, ThreadId(55)));
        assert_eq!(h.platform.pinned(), vec![MessageRef::new(GROUP, texts[0].id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn membership_change_is_posted_to_topic() {
        let h = harness(vec![seeded(8, 55)]);

        h.engine
            .handle(InboundEvent::Membership {
                profile: profile(8),
                state: MembershipState::Stopped,
            })
            .await
            .unwrap();

        assert_eq!(stored(&h, 8).await.membership, MembershipState::Stopped);
        let texts = h.platform.texts();
        assert!(texts[0].text.starts_with("en:UserStopped"));
        assert_eq!(texts[0].to, Destination::thread(GROUP, ThreadId(55)));
    }

    #[tokio::test(start_paused = true)]
    async fn chosen_locale_is_used_for_acks() {
        let h = harness(vec![seeded(8, 55)]);
        let choose = |locale: &str| InboundEvent::LocaleChosen {
            profile: profile(8),
            locale: locale.to_string(),
        };

        assert_eq!(
            h.engine.handle(choose("de")).await.unwrap(),
            RelayOutcome::Ignored
        );
        assert_eq!(
            h.engine.handle(choose("ru")).await.unwrap(),
            RelayOutcome::Applied
        );
        assert_eq!(stored(&h, 8).await.locale.as_deref(), Some("ru"));

        h.engine.handle(private(8, 1)).await.unwrap();
        assert_eq!(h.platform.texts()[0].text, "ru:MessageSent");
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_acknowledged_not_relayed() {
        let h = harness(vec![seeded(8, 55)]);

        let outcome = h
            .engine
            .handle(InboundEvent::PrivateEdited {
                profile: profile(8),
                message: MessageRef::new(ChatId(8), MessageId(4)),
            })
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Ignored);
        assert_eq!(h.platform.copy_attempts(), 0);
        assert_eq!(h.platform.texts()[0].text, "en:MessageEdited");
    }

    #[test]
    fn settings_follow_config() {
        let s = settings();
        assert_eq!(s.group, GROUP);
        assert_eq!(s.album.latency, Duration::from_millis(200));
        assert_eq!(s.ack_delete_after, Duration::from_secs(5));
        assert!(s.is_enabled("ru"));
        assert!(!s.is_enabled("de"));
    }
}
