//! Command, callback and group-message handling on top of [`LinkService`].
//!
//! Handlers never fail towards the transport: every error is turned into a reply
//! (private chats) or a log line (group monitoring).

use std::sync::Arc;

use tracing::warn;

use crate::{
    config::Config,
    domain::ChatId,
    errors::Error,
    link_service::LinkService,
    messaging::{port::MessagingPort, types::IncomingUpdate},
    ports::ChatDirectory,
    utils::split_lines_into_chunks,
};

mod callbacks;
mod commands;
mod deeplink;
mod monitor;

pub use commands::parse_command;
pub use deeplink::{parse_start_payload, StartPayload};

/// Fallback when neither `BOT_USERNAME` nor `get_me` provide a username.
pub const DEFAULT_BOT_USERNAME: &str = "YourBotUsername";

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct BotContext {
    pub cfg: Arc<Config>,
    pub bot_username: String,
    pub links: Arc<LinkService>,
    pub messenger: Arc<dyn MessagingPort>,
    pub directory: Arc<dyn ChatDirectory>,
}

/// Entry point for every update the adapter forwards.
pub async fn handle_update(ctx: &BotContext, update: IncomingUpdate) {
    match update {
        IncomingUpdate::Command(cmd) => commands::handle_command(ctx, cmd).await,
        IncomingUpdate::Callback(q) => callbacks::handle_callback(ctx, q).await,
        IncomingUpdate::GroupMessage(msg) => monitor::observe(ctx, &msg).await,
    }
}

/// Largest reply body: the configured safe limit, bounded by what the messenger accepts.
pub(crate) fn message_limit(ctx: &BotContext) -> usize {
    ctx.cfg
        .telegram_safe_limit
        .min(ctx.messenger.capabilities().max_message_len)
        .max(1)
}

/// Send HTML split into chunks under [`message_limit`]. Chunks break on line
/// boundaries; reply bodies keep each line's tags balanced.
pub(crate) async fn send_html_split(ctx: &BotContext, chat_id: ChatId, html: &str) {
    for chunk in split_lines_into_chunks(html, message_limit(ctx)) {
        if let Err(e) = ctx.messenger.send_html(chat_id, &chunk).await {
            warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
            return;
        }
    }
}

/// Reply with the user-facing text of `err`.
pub(crate) async fn reply_error(ctx: &BotContext, chat_id: ChatId, err: &Error) {
    send_html_split(ctx, chat_id, &crate::formatting::escape_html(&err.user_message())).await;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{collections::HashMap, sync::Arc};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        config::ActivityScope,
        domain::{ChatKind, ChatProfile, MemberStatus, UserId, UserProfile},
        messaging::{
            fake::FakeMessenger,
            types::{CallbackQuery, Command},
        },
        shortcode::RandomCodeGenerator,
        storage::{DataStore, LinkStore},
        Result,
    };

    pub(crate) const BOT: &str = "trackbot";

    /// Directory backed by fixed maps. Unknown members fail like a chat the bot
    /// cannot inspect.
    #[derive(Default)]
    pub(crate) struct MapDirectory {
        pub chats: HashMap<String, ChatProfile>,
        pub members: HashMap<(ChatId, UserId), MemberStatus>,
    }

    #[async_trait]
    impl ChatDirectory for MapDirectory {
        async fn resolve_discussion_chat(&self, username: &str) -> Result<Option<ChatProfile>> {
            Ok(self.chats.get(username).cloned())
        }

        async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus> {
            self.members
                .get(&(chat, user))
                .copied()
                .ok_or_else(|| Error::External("Bad Request: member list is inaccessible".to_string()))
        }
    }

    pub(crate) async fn context(
        dir: &tempfile::TempDir,
        directory: MapDirectory,
    ) -> (BotContext, Arc<FakeMessenger>) {
        context_with(dir, directory, FakeMessenger::new(), ActivityScope::Tracked).await
    }

    /// Like [`context`], with a chosen messenger and activity scope.
    pub(crate) async fn context_with(
        dir: &tempfile::TempDir,
        directory: MapDirectory,
        messenger: FakeMessenger,
        scope: ActivityScope,
    ) -> (BotContext, Arc<FakeMessenger>) {
        let mut env = HashMap::new();
        env.insert("BOT_TOKEN", "test-token");
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        let links = LinkStore::open(dir.path().join("links.db")).await.unwrap();
        let data = DataStore::open(dir.path().join("data.db")).await.unwrap();
        let service = LinkService::new(
            links,
            data,
            Box::new(RandomCodeGenerator::new(6)),
            8,
            scope,
        );
        let messenger = Arc::new(messenger);
        let ctx = BotContext {
            cfg: Arc::new(cfg),
            bot_username: BOT.to_string(),
            links: Arc::new(service),
            messenger: messenger.clone(),
            directory: Arc::new(directory),
        };
        (ctx, messenger)
    }

    pub(crate) fn user(id: i64) -> UserProfile {
        UserProfile {
            id: UserId(id),
            username: Some(format!("user{id}")),
            first_name: format!("User {id}"),
            last_name: None,
            language_code: Some("en".to_string()),
            is_bot: false,
        }
    }

    /// A private-chat command from `user_id`.
    pub(crate) fn command(user_id: i64, name: &str, args: &str) -> IncomingUpdate {
        IncomingUpdate::Command(Command {
            chat_id: ChatId(user_id),
            chat_kind: ChatKind::Private,
            from: user(user_id),
            name: name.to_string(),
            args: args.to_string(),
        })
    }

    pub(crate) fn callback(user_id: i64, data: &str) -> IncomingUpdate {
        IncomingUpdate::Callback(CallbackQuery {
            chat_id: ChatId(user_id),
            from: user(user_id),
            callback_id: format!("cb-{data}"),
            data: data.to_string(),
            message: Some(crate::domain::MessageRef {
                chat_id: ChatId(user_id),
                message_id: crate::domain::MessageId(500),
            }),
        })
    }
}
