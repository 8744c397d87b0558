//! Telegram adapter (teloxide).
//!
//! Implements the `ltb-core` [`MessagingPort`] and [`ChatDirectory`] over the Bot API
//! and feeds incoming updates into the core handlers.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode,
        Recipient,
    },
};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;

use ltb_core::{
    domain::{ChatId, ChatProfile, MemberStatus, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, ChatAction, InlineKeyboard, MessagingCapabilities, OutgoingDocument},
    },
    ports::ChatDirectory,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    /// Convert a core keyboard. Buttons whose URL does not parse are dropped.
    fn markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|b| match b.action {
                        ButtonAction::Callback(data) => {
                            Some(InlineKeyboardButton::callback(b.label, data))
                        }
                        ButtonAction::Url(raw) => match url::Url::parse(&raw) {
                            Ok(u) => Some(InlineKeyboardButton::url(b.label, u)),
                            Err(e) => {
                                debug!(url = %raw, error = %e, "dropping button with bad url");
                                None
                            }
                        },
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
        })
        .await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::UploadDocument => teloxide::types::ChatAction::UploadDocument,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::markup(keyboard);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let markup = Self::markup(keyboard);
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, doc: OutgoingDocument) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let file = InputFile::memory(doc.bytes.clone()).file_name(doc.file_name.clone());
                let mut req = self.bot.send_document(Self::tg_chat(chat_id), file);
                if let Some(caption) = &doc.caption {
                    req = req.caption(caption.clone());
                }
                req
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string()).show_alert(show_alert);
            }
            req
        })
        .await?;
        Ok(())
    }
}

/// Resolves public usernames with `getChat` and membership with `getChatMember`.
#[derive(Clone)]
pub struct TelegramDirectory {
    bot: Bot,
}

impl TelegramDirectory {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatDirectory for TelegramDirectory {
    async fn resolve_discussion_chat(&self, username: &str) -> Result<Option<ChatProfile>> {
        let recipient = Recipient::ChannelUsername(format!("@{}", username.trim_start_matches('@')));
        let chat = self
            .bot
            .get_chat(recipient)
            .await
            .map_err(TelegramMessenger::map_err)?;

        if chat.is_channel() {
            if let Some(linked) = chat.linked_chat_id() {
                let group = self
                    .bot
                    .get_chat(teloxide::types::ChatId(linked))
                    .await
                    .map_err(TelegramMessenger::map_err)?;
                debug!(channel = %username, group = linked, "using linked discussion group");
                return Ok(handlers::chat_profile(&group));
            }
        }
        Ok(handlers::chat_profile(&chat))
    }

    async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus> {
        let member = self
            .bot
            .get_chat_member(
                TelegramMessenger::tg_chat(chat),
                teloxide::types::UserId(user.0 as u64),
            )
            .await
            .map_err(TelegramMessenger::map_err)?;
        Ok(match member.kind.status() {
            ChatMemberStatus::Owner => MemberStatus::Owner,
            ChatMemberStatus::Administrator => MemberStatus::Administrator,
            ChatMemberStatus::Member => MemberStatus::Member,
            ChatMemberStatus::Restricted => MemberStatus::Restricted,
            ChatMemberStatus::Left => MemberStatus::Left,
            ChatMemberStatus::Banned => MemberStatus::Banned,
        })
    }
}
