use chrono::{DateTime, Utc};

use crate::domain::{ChatId, ChatKind, MessageId, UserId, UserProfile};

/// A tracked link. `code` is the globally unique short code used in deep links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub code: String,
    pub owner_id: UserId,
    pub destination_url: String,
    /// Telegram username when the destination is a `t.me` link.
    pub target_username: Option<String>,
    /// Chat where activity of clickers is attributed to this link.
    pub target_chat_id: Option<ChatId>,
    pub target_chat_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewLink {
    pub code: String,
    pub owner_id: UserId,
    pub destination_url: String,
    pub target_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A link together with its click count (used for listings).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSummary {
    pub link: Link,
    pub clicks: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickEvent {
    pub id: i64,
    pub link_code: String,
    pub clicker_id: UserId,
    pub clicker_username: Option<String>,
    pub clicker_first_name: Option<String>,
    pub clicker_language: Option<String>,
    /// Source tag carried by the deep link (`<code>-<source>`).
    pub source: Option<String>,
    /// Group or channel the click came from, when it did not come from a private chat.
    pub source_chat_id: Option<ChatId>,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewClick {
    pub link_code: String,
    pub clicker: UserProfile,
    pub source: Option<String>,
    pub source_chat_id: Option<ChatId>,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClickStats {
    pub total_clicks: u64,
    pub unique_clickers: u64,
    pub first_click_at: Option<DateTime<Utc>>,
    pub last_click_at: Option<DateTime<Utc>>,
}

/// First click of each distinct clicker on a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickerRow {
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub first_click_at: DateTime<Utc>,
}

/// One click on one of an owner's links, joined with the link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerClickRow {
    pub link_code: String,
    pub destination_url: String,
    pub clicker_id: UserId,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub interaction_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub group_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub message_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: i64,
    pub user_id: UserId,
    pub group_id: ChatId,
    pub link_code: Option<String>,
    pub action_type: String,
    pub message_id: Option<MessageId>,
    pub message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewActivity {
    pub user_id: UserId,
    pub group_id: ChatId,
    pub link_code: Option<String>,
    pub action_type: String,
    pub message_id: Option<MessageId>,
    pub message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Activity joined with the sender and group profiles, for exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityExportRow {
    pub user_id: UserId,
    /// `None` for messages logged without a tracked link.
    pub link_code: Option<String>,
    pub username: Option<String>,
    pub group_id: ChatId,
    pub group_username: Option<String>,
    pub group_title: Option<String>,
    pub message_id: Option<MessageId>,
    pub message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}
