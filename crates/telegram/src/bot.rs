use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, Update},
    },
    tokio_util::sync::CancellationToken,
    topicdesk_config::TopicdeskConfig,
    topicdesk_directory::DirectoryStore,
    topicdesk_relay::{RelayEngine, RelaySettings},
    tracing::{debug, error, info, warn},
};

use crate::{
    commands,
    error::{Error, Result},
    handlers,
    outbound::TelegramPlatform,
    state::BotContext,
    texts::Texts,
};

/// Connect with the configured token and poll until `cancel` fires.
pub async fn run(
    config: &TopicdeskConfig,
    directory: Arc<dyn DirectoryStore>,
    cancel: CancellationToken,
) -> Result<()> {
    // Client timeout must outlive the 30s long-polling timeout.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()?;
    let bot = Bot::with_client(config.bot.token.expose_secret(), client);

    let ctx = Arc::new(connect(bot, config, directory).await?);
    poll(Arc::clone(&ctx), cancel).await;

    let settings = ctx.engine.settings();
    commands::delete_menus(
        &ctx.bot,
        settings.operator,
        &settings.default_language,
        &settings.languages,
    )
    .await;
    Ok(())
}

/// Verify credentials, clear any webhook and register the command menus.
pub async fn connect(
    bot: Bot,
    config: &TopicdeskConfig,
    directory: Arc<dyn DirectoryStore>,
) -> Result<BotContext> {
    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    let texts = Arc::new(Texts::new(config.bot.source_url.clone()));
    let platform = Arc::new(TelegramPlatform::new(bot.clone()));
    let engine = Arc::new(RelayEngine::new(
        RelaySettings::from_config(config),
        Arc::clone(&platform) as _,
        directory,
        Arc::clone(&texts) as _,
    ));

    let settings = engine.settings();
    commands::set_menus(
        &bot,
        settings.operator,
        &settings.default_language,
        &settings.languages,
    )
    .await;

    info!(
        username = ?me.username,
        group_id = %settings.group,
        "telegram bot connected (webhook cleared)"
    );

    Ok(BotContext {
        bot,
        bot_username: me.username.clone(),
        engine,
        platform,
        texts,
    })
}

/// Long-poll for updates; each update runs on its own task so album parts
/// can meet in the aggregator.
pub async fn poll(ctx: Arc<BotContext>, cancel: CancellationToken) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = ctx
            .bot
            .get_updates()
            .offset(offset)
            .timeout(30)
            .allowed_updates(vec![
                AllowedUpdate::Message,
                AllowedUpdate::EditedMessage,
                AllowedUpdate::CallbackQuery,
                AllowedUpdate::MyChatMember,
            ])
            .send();

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = request => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move { process(&ctx, update).await });
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!("telegram polling disabled: another instance is running with this token");
                cancel.cancel();
                break;
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(5)) => {},
                }
            },
        }
    }

    info!("telegram polling stopped");
}

async fn process(ctx: &BotContext, update: Update) {
    let update_id = update.id.0;
    match handlers::handle_update(ctx, &update).await {
        Ok(()) => {},
        Err(Error::Relay(e)) => {
            debug!(update_id, error = %e, "relay failure already reported");
        },
        Err(e) => {
            error!(update_id, error = %e, "error handling telegram update");
            let payload = serde_json::to_string_pretty(&update).unwrap_or_default();
            let failure = topicdesk_relay::Error::external("telegram update", e);
            ctx.engine
                .reporter()
                .report_failure(&format!("update_{update_id}"), &failure, &payload)
                .await;
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        serde_json::{Value, json},
        std::sync::Mutex,
        topicdesk_directory::InMemoryDirectory,
    };

    #[derive(Clone)]
    struct MockBotApi {
        calls: Arc<Mutex<Vec<String>>>,
        conflict: bool,
    }

    async fn bot_api_handler(
        State(state): State<MockBotApi>,
        uri: Uri,
        _body: Bytes,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        state.calls.lock().unwrap().push(method.clone());
        if method == "GetUpdates" && state.conflict {
            return Json(json!({
                "ok": false,
                "error_code": 409,
                "description": "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running"
            }));
        }
        let result = match method.as_str() {
            "GetUpdates" => json!([]),
            _ => json!(true),
        };
        Json(json!({ "ok": true, "result": result }))
    }

    async fn context(conflict: bool) -> (Arc<BotContext>, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/{*path}", post(bot_api_handler))
            .with_state(MockBotApi {
                calls: Arc::clone(&calls),
                conflict,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock bot api");
        });

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        let bot = Bot::new("test-token").set_api_url(api_url);
        let platform = Arc::new(TelegramPlatform::new(bot.clone()));
        let texts = Arc::new(Texts::default());
        let mut config = TopicdeskConfig::default();
        config.bot.group_id = -100123;
        config.bot.dev_id = 42;
        let engine = Arc::new(RelayEngine::new(
            RelaySettings::from_config(&config),
            Arc::clone(&platform) as _,
            Arc::new(InMemoryDirectory::new()),
            Arc::clone(&texts) as _,
        ));
        let ctx = BotContext {
            bot,
            bot_username: Some("desk_bot".into()),
            engine,
            platform,
            texts,
        };
        (Arc::new(ctx), calls)
    }

    #[tokio::test]
    async fn polling_stops_on_cancel() {
        let (ctx, calls) = context(false).await;
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), poll(ctx, cancel))
            .await
            .expect("poll loop should exit after cancel");
        assert!(calls.lock().unwrap().iter().any(|m| m == "GetUpdates"));
    }

    #[tokio::test]
    async fn polling_conflict_cancels_the_token() {
        let (ctx, _calls) = context(true).await;
        let cancel = CancellationToken::new();

        tokio::time::timeout(Duration::from_secs(5), poll(ctx, cancel.clone()))
            .await
            .expect("poll loop should exit on conflict");
        assert!(cancel.is_cancelled());
    }
}
