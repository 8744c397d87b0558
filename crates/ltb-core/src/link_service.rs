//! Link lifecycle: creation with bounded short-code retry, click recording,
//! ownership-checked reads and deletes, statistics and group activity attribution.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    config::{ActivityScope, Config},
    destination::parse_destination,
    domain::{ChatId, ChatProfile, UserId, UserProfile},
    errors::Error,
    messaging::types::GroupMessage,
    shortcode::{CodeGenerator, RandomCodeGenerator},
    storage::{
        models::{
            ClickEvent, ClickStats, Group, Link, LinkSummary, NewActivity, NewClick, NewLink,
            User,
        },
        DataStore, LinkStore,
    },
    utils::clip_chars,
    Result,
};

/// Stored message previews are cut to this many characters.
pub const MESSAGE_PREVIEW_MAX_CHARS: usize = 500;

/// Where a click came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClickSource {
    /// Tag from the deep link (`<code>-<tag>`).
    pub tag: Option<String>,
    /// Group or channel the deep link was opened from.
    pub chat_id: Option<ChatId>,
}

/// What `delete_link` removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedLink {
    pub link: Link,
    pub clicks_removed: u64,
    pub activity_removed: u64,
}

pub struct LinkService {
    links: LinkStore,
    data: DataStore,
    codes: Box<dyn CodeGenerator>,
    max_attempts: usize,
    activity_scope: ActivityScope,
}

impl LinkService {
    pub fn new(
        links: LinkStore,
        data: DataStore,
        codes: Box<dyn CodeGenerator>,
        max_attempts: usize,
        activity_scope: ActivityScope,
    ) -> Self {
        Self {
            links,
            data,
            codes,
            max_attempts: max_attempts.max(1),
            activity_scope,
        }
    }

    pub fn from_config(cfg: &Config, links: LinkStore, data: DataStore) -> Self {
        Self::new(
            links,
            data,
            Box::new(RandomCodeGenerator::new(cfg.short_code_length)),
            cfg.short_code_max_attempts,
            cfg.activity_scope,
        )
    }

    pub fn links(&self) -> &LinkStore {
        &self.links
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub async fn create_link(&self, owner_id: UserId, destination: &str) -> Result<Link> {
        let dest = parse_destination(destination)?;

        for attempt in 1..=self.max_attempts {
            let code = self.codes.generate();
            if self.links.exists(&code).await? {
                debug!(attempt, %code, "short code collision");
                continue;
            }

            let new = NewLink {
                code: code.clone(),
                owner_id,
                destination_url: dest.url.clone(),
                target_username: dest.telegram_username.clone(),
                created_at: Utc::now(),
            };
            match self.links.create(new).await {
                Ok(link) => {
                    info!(
                        owner = owner_id.0,
                        code = %link.code,
                        url = %link.destination_url,
                        "link created"
                    );
                    return Ok(link);
                }
                // Lost a race with a concurrent insert of the same code.
                Err(Error::Constraint(_)) => {
                    debug!(attempt, %code, "short code taken during insert");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts = self.max_attempts, "short code generation exhausted");
        Err(Error::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    pub async fn record_click(
        &self,
        code: &str,
        clicker: UserProfile,
        source: ClickSource,
    ) -> Result<ClickEvent> {
        let event = self
            .links
            .insert_click(NewClick {
                link_code: code.to_string(),
                clicker,
                source: source.tag,
                source_chat_id: source.chat_id,
                clicked_at: Utc::now(),
            })
            .await?;
        debug!(code, clicker = event.clicker_id.0, source = ?event.source, "click recorded");
        Ok(event)
    }

    /// Links owned by `owner_id`, newest first.
    pub async fn list_links(&self, owner_id: UserId) -> Result<Vec<LinkSummary>> {
        self.links.list_by_owner(owner_id).await
    }

    pub async fn get_link(&self, code: &str) -> Result<Link> {
        self.links.get(code).await
    }

    /// Like [`get_link`](Self::get_link), but only for the link's owner.
    pub async fn get_owned_link(&self, code: &str, requester: UserId) -> Result<Link> {
        let link = self.links.get(code).await?;
        if link.owner_id != requester {
            return Err(Error::PermissionDenied(format!(
                "user {} does not own link {code}",
                requester.0
            )));
        }
        Ok(link)
    }

    /// Resolve `chat` (numeric id or `@username`) to a group already seen by the
    /// bot, provided one of `requester`'s links targets it.
    pub async fn get_owned_group(&self, chat: &str, requester: UserId) -> Result<Group> {
        let chat = chat.trim();
        let group = match chat.parse::<i64>() {
            Ok(id) => self.data.get_group(ChatId(id)).await?,
            Err(_) => self
                .data
                .find_group_by_username(chat)
                .await?
                .ok_or_else(|| Error::NotFound(format!("group `{chat}`")))?,
        };

        let username = group.username.as_deref().map(str::to_lowercase);
        let names_group = |name: &Option<String>| match (name, &username) {
            (Some(name), Some(username)) => {
                name.trim_start_matches('@').to_lowercase() == *username
            }
            _ => false,
        };
        let targeted = self
            .links
            .list_by_owner(requester)
            .await?
            .iter()
            .any(|s| {
                s.link.target_chat_id == Some(group.id)
                    || names_group(&s.link.target_chat_username)
                    || names_group(&s.link.target_username)
            });
        if !targeted {
            return Err(Error::PermissionDenied(format!(
                "user {} has no link targeting group {}",
                requester.0, group.id.0
            )));
        }
        Ok(group)
    }

    /// Delete a link with its clicks and attributed activity.
    pub async fn delete_link(&self, code: &str, requester: UserId) -> Result<DeletedLink> {
        let link = self.get_owned_link(code, requester).await?;
        let clicks_removed = self.links.delete(code).await?;
        let activity_removed = self.data.delete_activity_for_link(code).await?;
        info!(
            code,
            owner = requester.0,
            clicks_removed,
            activity_removed,
            "link deleted"
        );
        Ok(DeletedLink {
            link,
            clicks_removed,
            activity_removed,
        })
    }

    pub async fn get_stats(&self, code: &str) -> Result<ClickStats> {
        if !self.links.exists(code).await? {
            return Err(Error::NotFound(format!("link `{code}`")));
        }
        self.links.click_stats(code).await
    }

    /// Remember the chat whose messages count as activity for this link.
    pub async fn set_target_chat(&self, code: &str, chat: &ChatProfile) -> Result<Link> {
        let link = self
            .links
            .update_target_chat(code, Some(chat.id), chat.username.clone())
            .await?;
        debug!(code, chat_id = chat.id.0, "link target chat set");
        Ok(link)
    }

    /// Upsert the sender of a private interaction.
    pub async fn track_user(&self, profile: &UserProfile) -> Result<User> {
        self.data.upsert_user(profile.clone(), Utc::now()).await
    }

    /// Record a group message: refresh group/user/member rows, then log activity
    /// according to the configured scope. Returns the number of activity records written.
    pub async fn observe_group_message(&self, msg: &GroupMessage) -> Result<usize> {
        if msg.from.is_bot {
            return Ok(0);
        }

        let now = Utc::now();
        self.data.upsert_group(msg.chat.clone(), now).await?;
        self.data.upsert_user(msg.from.clone(), now).await?;
        self.data
            .upsert_member(msg.chat.id, msg.from.clone(), now)
            .await?;

        let Some(text) = msg.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(0);
        };

        let codes = self
            .links
            .links_clicked_in_chat(msg.from.id, msg.chat.id, msg.chat.username.clone())
            .await?;

        let attributed: Vec<Option<String>> = match (codes.is_empty(), self.activity_scope) {
            (false, _) => codes.into_iter().map(Some).collect(),
            (true, ActivityScope::All) => vec![None],
            (true, ActivityScope::Tracked) => return Ok(0),
        };

        let preview = clip_chars(text, MESSAGE_PREVIEW_MAX_CHARS);
        let written = attributed.len();
        for link_code in attributed {
            self.data
                .insert_activity(NewActivity {
                    user_id: msg.from.id,
                    group_id: msg.chat.id,
                    link_code,
                    action_type: "message".to_string(),
                    message_id: Some(msg.message_id),
                    message_preview: Some(preview.clone()),
                    created_at: now,
                })
                .await?;
        }
        debug!(chat_id = msg.chat.id.0, user = msg.from.id.0, written, "group activity recorded");
        Ok(written)
    }
}
