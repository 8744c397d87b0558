use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatProfile, MemberStatus, UserId},
    Result,
};

/// Lookup of Telegram chats and their members.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Resolve `username` to the chat where members talk: a channel's linked
    /// discussion group when it has one, otherwise the chat itself.
    ///
    /// `Ok(None)` when the name does not belong to a group or channel.
    async fn resolve_discussion_chat(&self, username: &str) -> Result<Option<ChatProfile>>;

    /// Current standing of `user` in `chat`. Fails when the bot cannot see the
    /// chat's member list.
    async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus>;
}
