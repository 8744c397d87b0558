//! Conversion of teloxide updates into core [`IncomingUpdate`]s.
//!
//! All behavior lives in `ltb_core::bot`; these endpoints only translate and forward.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Chat, Message, User},
};
use tracing::trace;

use ltb_core::{
    bot::{handle_update, parse_command, BotContext},
    domain::{ChatId, ChatKind, ChatProfile, MessageId, MessageRef, UserId, UserProfile},
    messaging::types::{self, Command, GroupMessage, IncomingUpdate},
};

pub async fn handle_message(msg: Message, ctx: Arc<BotContext>) -> ResponseResult<()> {
    if let Some(update) = message_update(&msg, &ctx.bot_username) {
        handle_update(&ctx, update).await;
    }
    Ok(())
}

pub async fn handle_callback(q: CallbackQuery, ctx: Arc<BotContext>) -> ResponseResult<()> {
    handle_update(&ctx, IncomingUpdate::Callback(callback_query(q))).await;
    Ok(())
}

fn message_update(msg: &Message, bot_username: &str) -> Option<IncomingUpdate> {
    // Anonymous admins and channel posts have no sender to attribute.
    let from = msg.from()?;
    let chat_kind = chat_kind(&msg.chat);

    if let Some((name, args)) = msg.text().and_then(|t| parse_command(t, bot_username)) {
        return Some(IncomingUpdate::Command(Command {
            chat_id: ChatId(msg.chat.id.0),
            chat_kind,
            from: user_profile(from),
            name,
            args,
        }));
    }

    let Some(chat) = chat_profile(&msg.chat) else {
        trace!(user = from.id.0, "ignoring private non-command message");
        return None;
    };
    Some(IncomingUpdate::GroupMessage(GroupMessage {
        chat,
        from: user_profile(from),
        message_id: MessageId(msg.id.0),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
    }))
}

fn callback_query(q: CallbackQuery) -> types::CallbackQuery {
    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let from = user_profile(&q.from);
    types::CallbackQuery {
        // Without the message, the user's private chat is the only place to answer.
        chat_id: message.map(|m| m.chat_id).unwrap_or(ChatId(from.id.0)),
        from,
        callback_id: q.id,
        data: q.data.unwrap_or_default(),
        message,
    }
}

pub(crate) fn user_profile(u: &User) -> UserProfile {
    UserProfile {
        id: UserId(u.id.0 as i64),
        username: u.username.clone(),
        first_name: u.first_name.clone(),
        last_name: u.last_name.clone(),
        language_code: u.language_code.clone(),
        is_bot: u.is_bot,
    }
}

pub(crate) fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Private
    }
}

/// Profile of a group, supergroup or channel; `None` for private chats.
pub(crate) fn chat_profile(chat: &Chat) -> Option<ChatProfile> {
    let kind = chat_kind(chat);
    if kind == ChatKind::Private {
        return None;
    }
    Some(ChatProfile {
        id: ChatId(chat.id.0),
        kind,
        title: chat.title().map(str::to_string),
        username: chat.username().map(str::to_string),
    })
}
