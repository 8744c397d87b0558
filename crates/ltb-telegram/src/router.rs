use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use ltb_core::{
    bot::{BotContext, DEFAULT_BOT_USERNAME},
    config::Config,
    link_service::LinkService,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::ChatDirectory,
};

use crate::{handlers, TelegramDirectory, TelegramMessenger};

/// `BOT_USERNAME` wins; otherwise ask Telegram, and fall back to a placeholder.
async fn resolve_bot_username(bot: &Bot, cfg: &Config) -> String {
    if let Some(name) = &cfg.bot_username {
        return name.clone();
    }
    match bot.get_me().await {
        Ok(me) => me.username().to_string(),
        Err(e) => {
            warn!(error = %e, "get_me failed; deep links use a placeholder bot name");
            DEFAULT_BOT_USERNAME.to_string()
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, links: Arc<LinkService>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());
    let bot_username = resolve_bot_username(&bot, &cfg).await;

    info!(
        bot = %bot_username,
        db = %cfg.db_path.display(),
        data_db = %cfg.data_db_path.display(),
        scope = ?cfg.activity_scope,
        "link tracker started"
    );
    if cfg.api_id.is_some() || cfg.api_hash.is_some() {
        info!("API_ID/API_HASH are set but unused by the Bot API transport");
    }

    // Replies are throttled here; 429 RetryAfter is still retried by the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let directory: Arc<dyn ChatDirectory> = Arc::new(TelegramDirectory::new(bot.clone()));

    let ctx = Arc::new(BotContext {
        cfg,
        bot_username,
        links,
        messenger,
        directory,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .build()
        .dispatch()
        .await;

    info!("link tracker stopped");
    Ok(())
}
