use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::{
    domain::{ChatId, ChatKind, ChatProfile, MessageId, UserId, UserProfile},
    errors::Error,
    storage::{
        models::{ActivityExportRow, ActivityRecord, Group, Member, NewActivity, User},
        schema, to_u64, Database, OptionalRow,
    },
    Result,
};

const USER_COLUMNS: &str = "id, username, first_name, last_name, language_code, is_bot, \
                            first_seen_at, last_seen_at, interaction_count";

const ACTIVITY_COLUMNS: &str =
    "id, user_id, chat_id, link_code, action_type, message_id, message_preview, created_at";

const GROUP_COLUMNS: &str = "id, chat_type, title, username, first_seen_at, last_seen_at";

const ACTIVITY_EXPORT_SELECT: &str =
    "SELECT a.user_id, a.link_code, u.username, a.chat_id, c.username, c.title, a.message_id, \
       a.message_preview, a.created_at \
     FROM activity a \
     LEFT JOIN users u ON u.id = a.user_id \
     LEFT JOIN chats c ON c.id = a.chat_id";

/// Users, groups, group members and the activity log (`DATA_DB_PATH`).
#[derive(Clone, Debug)]
pub struct DataStore {
    db: Database,
}

impl DataStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            db: Database::open(path, schema::migrate_data).await?,
        })
    }

    /// Create the user on first sight; afterwards refresh the profile and bump
    /// `interaction_count`.
    pub async fn upsert_user(&self, profile: UserProfile, seen_at: DateTime<Utc>) -> Result<User> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, first_name, last_name, language_code, is_bot, \
                       first_seen_at, last_seen_at, interaction_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1) \
                     ON CONFLICT(id) DO UPDATE SET \
                       username = excluded.username, \
                       first_name = excluded.first_name, \
                       last_name = excluded.last_name, \
                       language_code = excluded.language_code, \
                       last_seen_at = excluded.last_seen_at, \
                       interaction_count = users.interaction_count + 1",
                    params![
                        profile.id.0,
                        profile.username,
                        profile.first_name,
                        profile.last_name,
                        profile.language_code,
                        profile.is_bot,
                        seen_at
                    ],
                )?;
                get_user(conn, profile.id)
            })
            .await
    }

    pub async fn get_user(&self, id: UserId) -> Result<User> {
        self.db.call(move |conn| get_user(conn, id)).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM users").await
    }

    pub async fn upsert_group(&self, chat: ChatProfile, seen_at: DateTime<Utc>) -> Result<Group> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chats (id, chat_type, title, username, first_seen_at, last_seen_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                     ON CONFLICT(id) DO UPDATE SET \
                       chat_type = excluded.chat_type, \
                       title = excluded.title, \
                       username = excluded.username, \
                       last_seen_at = excluded.last_seen_at",
                    params![
                        chat.id.0,
                        chat.kind.as_str(),
                        chat.title,
                        chat.username,
                        seen_at
                    ],
                )?;
                get_group(conn, chat.id)
            })
            .await
    }

    pub async fn get_group(&self, id: ChatId) -> Result<Group> {
        self.db.call(move |conn| get_group(conn, id)).await
    }

    /// Case-insensitive lookup by public username, with or without `@`.
    pub async fn find_group_by_username(&self, username: &str) -> Result<Option<Group>> {
        let username = username.trim_start_matches('@').to_lowercase();
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {GROUP_COLUMNS} FROM chats WHERE LOWER(username) = ?1 \
                     ORDER BY last_seen_at DESC LIMIT 1"
                );
                Ok(conn.query_row(&sql, params![username], map_group).optional()?)
            })
            .await
    }

    pub async fn count_groups(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM chats").await
    }

    /// Passive membership tracking: one row per (group, user), counting messages.
    pub async fn upsert_member(
        &self,
        group_id: ChatId,
        profile: UserProfile,
        seen_at: DateTime<Utc>,
    ) -> Result<Member> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO members (chat_id, user_id, username, first_name, first_seen_at, \
                       last_seen_at, message_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1) \
                     ON CONFLICT(chat_id, user_id) DO UPDATE SET \
                       username = excluded.username, \
                       first_name = excluded.first_name, \
                       last_seen_at = excluded.last_seen_at, \
                       message_count = members.message_count + 1",
                    params![
                        group_id.0,
                        profile.id.0,
                        profile.username,
                        profile.first_name,
                        seen_at
                    ],
                )?;
                let member = conn.query_row(
                    "SELECT chat_id, user_id, username, first_name, first_seen_at, last_seen_at, \
                       message_count \
                     FROM members WHERE chat_id = ?1 AND user_id = ?2",
                    params![group_id.0, profile.id.0],
                    |r| {
                        Ok(Member {
                            group_id: ChatId(r.get(0)?),
                            user_id: UserId(r.get(1)?),
                            username: r.get(2)?,
                            first_name: r.get(3)?,
                            first_seen_at: r.get(4)?,
                            last_seen_at: r.get(5)?,
                            message_count: to_u64(r.get(6)?),
                        })
                    },
                )?;
                Ok(member)
            })
            .await
    }

    pub async fn count_members(&self, group_id: ChatId) -> Result<u64> {
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM members WHERE chat_id = ?1",
                    params![group_id.0],
                    |r| r.get(0),
                )?;
                Ok(to_u64(n))
            })
            .await
    }

    pub async fn insert_activity(&self, new: NewActivity) -> Result<ActivityRecord> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO activity (user_id, chat_id, link_code, action_type, message_id, \
                       message_preview, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        new.user_id.0,
                        new.group_id.0,
                        new.link_code,
                        new.action_type,
                        new.message_id.map(|m| m.0),
                        new.message_preview,
                        new.created_at
                    ],
                )?;
                Ok(ActivityRecord {
                    id: conn.last_insert_rowid(),
                    user_id: new.user_id,
                    group_id: new.group_id,
                    link_code: new.link_code,
                    action_type: new.action_type,
                    message_id: new.message_id,
                    message_preview: new.message_preview,
                    created_at: new.created_at,
                })
            })
            .await
    }

    /// Activity attributed to a link, newest first.
    pub async fn activity_for_link(&self, code: &str) -> Result<Vec<ActivityRecord>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activity WHERE link_code = ?1 \
                     ORDER BY created_at DESC, id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![code], map_activity)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Activity for a link joined with user and group profiles, newest first.
    pub async fn activity_export_rows(&self, code: &str) -> Result<Vec<ActivityExportRow>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let sql = format!(
                    "{ACTIVITY_EXPORT_SELECT} WHERE a.link_code = ?1 \
                     ORDER BY a.created_at DESC, a.id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![code], map_export_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Every activity row logged in a group, attributed or not, newest first.
    pub async fn group_activity_export_rows(
        &self,
        group_id: ChatId,
    ) -> Result<Vec<ActivityExportRow>> {
        self.db
            .call(move |conn| {
                let sql = format!(
                    "{ACTIVITY_EXPORT_SELECT} WHERE a.chat_id = ?1 \
                     ORDER BY a.created_at DESC, a.id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![group_id.0], map_export_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    pub async fn count_activity_for_link(&self, code: &str) -> Result<u64> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM activity WHERE link_code = ?1",
                    params![code],
                    |r| r.get(0),
                )?;
                Ok(to_u64(n))
            })
            .await
    }

    pub async fn count_activity_for_user(&self, code: &str, user_id: UserId) -> Result<u64> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM activity WHERE link_code = ?1 AND user_id = ?2",
                    params![code, user_id.0],
                    |r| r.get(0),
                )?;
                Ok(to_u64(n))
            })
            .await
    }

    /// Activity counts per user for one link.
    pub async fn activity_counts_by_user(&self, code: &str) -> Result<Vec<(UserId, u64)>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, COUNT(*) FROM activity WHERE link_code = ?1 \
                     GROUP BY user_id ORDER BY user_id",
                )?;
                let rows = stmt.query_map(params![code], |r| {
                    Ok((UserId(r.get(0)?), to_u64(r.get(1)?)))
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    pub async fn count_activity_in_group(&self, group_id: ChatId) -> Result<u64> {
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM activity WHERE chat_id = ?1",
                    params![group_id.0],
                    |r| r.get(0),
                )?;
                Ok(to_u64(n))
            })
            .await
    }

    /// Remove all activity attributed to a link. Returns the number of rows removed.
    pub async fn delete_activity_for_link(&self, code: &str) -> Result<u64> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let n = conn.execute("DELETE FROM activity WHERE link_code = ?1", params![code])?;
                Ok(n as u64)
            })
            .await
    }

    async fn count(&self, sql: &'static str) -> Result<u64> {
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
                Ok(to_u64(n))
            })
            .await
    }
}

fn get_user(conn: &Connection, id: UserId) -> Result<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, params![id.0], map_user)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("user {}", id.0)))
}

fn get_group(conn: &Connection, id: ChatId) -> Result<Group> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM chats WHERE id = ?1");
    conn.query_row(&sql, params![id.0], map_group)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("group {}", id.0)))
}

fn map_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    let kind: String = row.get(1)?;
    Ok(Group {
        id: ChatId(row.get(0)?),
        kind: ChatKind::parse(&kind).unwrap_or(ChatKind::Group),
        title: row.get(2)?,
        username: row.get(3)?,
        first_seen_at: row.get(4)?,
        last_seen_at: row.get(5)?,
    })
}

fn map_export_row(row: &Row<'_>) -> rusqlite::Result<ActivityExportRow> {
    Ok(ActivityExportRow {
        user_id: UserId(row.get(0)?),
        link_code: row.get(1)?,
        username: row.get(2)?,
        group_id: ChatId(row.get(3)?),
        group_username: row.get(4)?,
        group_title: row.get(5)?,
        message_id: row.get::<_, Option<i32>>(6)?.map(MessageId),
        message_preview: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        language_code: row.get(4)?,
        is_bot: row.get(5)?,
        first_seen_at: row.get(6)?,
        last_seen_at: row.get(7)?,
        interaction_count: to_u64(row.get(8)?),
    })
}

fn map_activity(row: &Row<'_>) -> rusqlite::Result<ActivityRecord> {
    Ok(ActivityRecord {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        group_id: ChatId(row.get(2)?),
        link_code: row.get(3)?,
        action_type: row.get(4)?,
        message_id: row.get::<_, Option<i32>>(5)?.map(MessageId),
        message_preview: row.get(6)?,
        created_at: row.get(7)?,
    })
}
