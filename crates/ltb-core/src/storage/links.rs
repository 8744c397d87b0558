use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    storage::{
        models::{
            ClickEvent, ClickStats, ClickerRow, Link, LinkSummary, NewClick, NewLink,
            OwnerClickRow,
        },
        schema, to_u64, Database, OptionalRow,
    },
    Result,
};

const LINK_COLUMNS: &str = "code, owner_id, destination_url, target_username, \
                            target_chat_id, target_chat_username, created_at";

const CLICK_COLUMNS: &str = "id, link_code, clicker_id, clicker_username, clicker_first_name, \
                             clicker_language, source, source_chat_id, clicked_at";

/// Links and their click events (`DB_PATH`).
#[derive(Clone, Debug)]
pub struct LinkStore {
    db: Database,
}

impl LinkStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            db: Database::open(path, schema::migrate_links).await?,
        })
    }

    /// Insert a new link. Fails with `Constraint` when the code is taken.
    pub async fn create(&self, new: NewLink) -> Result<Link> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO links (code, owner_id, destination_url, target_username, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        new.code,
                        new.owner_id.0,
                        new.destination_url,
                        new.target_username,
                        new.created_at
                    ],
                )?;
                get_link(conn, &new.code)
            })
            .await
    }

    pub async fn get(&self, code: &str) -> Result<Link> {
        let code = code.to_string();
        self.db.call(move |conn| get_link(conn, &code)).await
    }

    pub async fn exists(&self, code: &str) -> Result<bool> {
        let code = code.to_string();
        self.db.call(move |conn| link_exists(conn, &code)).await
    }

    /// Links of `owner_id`, newest first, with their click counts.
    pub async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<LinkSummary>> {
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {LINK_COLUMNS}, \
                       (SELECT COUNT(*) FROM clicks WHERE clicks.link_code = links.code) \
                     FROM links WHERE owner_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![owner_id.0], |row| {
                    Ok(LinkSummary {
                        link: map_link(row)?,
                        clicks: to_u64(row.get(7)?),
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Record the chat where activity for this link is attributed.
    pub async fn update_target_chat(
        &self,
        code: &str,
        chat_id: Option<ChatId>,
        chat_username: Option<String>,
    ) -> Result<Link> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE links SET target_chat_id = ?2, target_chat_username = ?3 WHERE code = ?1",
                    params![code, chat_id.map(|c| c.0), chat_username],
                )?;
                if changed == 0 {
                    return Err(link_not_found(&code));
                }
                get_link(conn, &code)
            })
            .await
    }

    /// Delete a link and (via `ON DELETE CASCADE`) its clicks.
    ///
    /// Returns the number of click events removed with it.
    pub async fn delete(&self, code: &str) -> Result<u64> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let clicks = count_clicks(&tx, &code)?;
                let removed = tx.execute("DELETE FROM links WHERE code = ?1", params![code])?;
                if removed == 0 {
                    return Err(link_not_found(&code));
                }
                tx.commit()?;
                Ok(clicks)
            })
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.db
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))?;
                Ok(to_u64(n))
            })
            .await
    }

    pub async fn count_by_owner(&self, owner_id: UserId) -> Result<u64> {
        self.db
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM links WHERE owner_id = ?1",
                    params![owner_id.0],
                    |r| r.get(0),
                )?;
                Ok(to_u64(n))
            })
            .await
    }

    /// Append a click event. Fails with `NotFound` when the link does not exist.
    pub async fn insert_click(&self, new: NewClick) -> Result<ClickEvent> {
        self.db
            .call(move |conn| {
                if !link_exists(conn, &new.link_code)? {
                    return Err(link_not_found(&new.link_code));
                }
                conn.execute(
                    "INSERT INTO clicks (link_code, clicker_id, clicker_username, clicker_first_name, \
                       clicker_language, source, source_chat_id, clicked_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        new.link_code,
                        new.clicker.id.0,
                        new.clicker.username,
                        new.clicker.first_name,
                        new.clicker.language_code,
                        new.source,
                        new.source_chat_id.map(|c| c.0),
                        new.clicked_at
                    ],
                )?;
                Ok(ClickEvent {
                    id: conn.last_insert_rowid(),
                    link_code: new.link_code,
                    clicker_id: new.clicker.id,
                    clicker_username: new.clicker.username,
                    clicker_first_name: Some(new.clicker.first_name),
                    clicker_language: new.clicker.language_code,
                    source: new.source,
                    source_chat_id: new.source_chat_id,
                    clicked_at: new.clicked_at,
                })
            })
            .await
    }

    /// All clicks on a link, in click order.
    pub async fn clicks_for_link(&self, code: &str) -> Result<Vec<ClickEvent>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {CLICK_COLUMNS} FROM clicks WHERE link_code = ?1 \
                     ORDER BY clicked_at ASC, id ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![code], map_click)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    pub async fn count_clicks(&self, code: &str) -> Result<u64> {
        let code = code.to_string();
        self.db.call(move |conn| count_clicks(conn, &code)).await
    }

    pub async fn click_stats(&self, code: &str) -> Result<ClickStats> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let stats = conn.query_row(
                    "SELECT COUNT(*), COUNT(DISTINCT clicker_id), MIN(clicked_at), MAX(clicked_at) \
                     FROM clicks WHERE link_code = ?1",
                    params![code],
                    |r| {
                        Ok(ClickStats {
                            total_clicks: to_u64(r.get(0)?),
                            unique_clickers: to_u64(r.get(1)?),
                            first_click_at: r.get::<_, Option<DateTime<Utc>>>(2)?,
                            last_click_at: r.get::<_, Option<DateTime<Utc>>>(3)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await
    }

    /// Click counts per source tag, most clicks first. `None` groups untagged clicks.
    pub async fn source_breakdown(&self, code: &str) -> Result<Vec<(Option<String>, u64)>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT source, COUNT(*) AS n FROM clicks WHERE link_code = ?1 \
                     GROUP BY source ORDER BY n DESC, source ASC",
                )?;
                let rows = stmt.query_map(params![code], |r| {
                    Ok((r.get::<_, Option<String>>(0)?, to_u64(r.get(1)?)))
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// One row per distinct clicker with the profile captured at their first click.
    pub async fn unique_clickers(&self, code: &str) -> Result<Vec<ClickerRow>> {
        let code = code.to_string();
        self.db
            .call(move |conn| {
                // SQLite takes bare columns from the row that produced MIN().
                let mut stmt = conn.prepare(
                    "SELECT clicker_id, clicker_first_name, clicker_username, clicker_language, \
                       MIN(clicked_at) AS first_click \
                     FROM clicks WHERE link_code = ?1 \
                     GROUP BY clicker_id ORDER BY first_click ASC, clicker_id ASC",
                )?;
                let rows = stmt.query_map(params![code], |r| {
                    Ok(ClickerRow {
                        user_id: UserId(r.get(0)?),
                        first_name: r.get(1)?,
                        username: r.get(2)?,
                        language_code: r.get(3)?,
                        first_click_at: r.get(4)?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Every click on links owned by `owner_id`, joined with the link, in click order.
    pub async fn clicks_for_owner(&self, owner_id: UserId) -> Result<Vec<OwnerClickRow>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.link_code, l.destination_url, c.clicker_id, c.clicked_at \
                     FROM clicks c JOIN links l ON l.code = c.link_code \
                     WHERE l.owner_id = ?1 \
                     ORDER BY c.clicked_at ASC, c.id ASC",
                )?;
                let rows = stmt.query_map(params![owner_id.0], |r| {
                    Ok(OwnerClickRow {
                        link_code: r.get(0)?,
                        destination_url: r.get(1)?,
                        clicker_id: UserId(r.get(2)?),
                        clicked_at: r.get(3)?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Codes of links targeting this chat (by id or username) that `user_id` has clicked.
    pub async fn links_clicked_in_chat(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        chat_username: Option<String>,
    ) -> Result<Vec<String>> {
        let chat_username = chat_username.map(|u| u.trim_start_matches('@').to_lowercase());
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT l.code FROM links l \
                     JOIN clicks c ON c.link_code = l.code \
                     WHERE c.clicker_id = ?1 \
                       AND (l.target_chat_id = ?2 \
                            OR (?3 IS NOT NULL AND (LOWER(l.target_chat_username) = ?3 \
                                                    OR LOWER(l.target_username) = ?3))) \
                     ORDER BY l.code",
                )?;
                let rows = stmt.query_map(params![user_id.0, chat_id.0, chat_username], |r| {
                    r.get::<_, String>(0)
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }
}

fn get_link(conn: &Connection, code: &str) -> Result<Link> {
    let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE code = ?1");
    conn.query_row(&sql, params![code], map_link)
        .optional()?
        .ok_or_else(|| link_not_found(code))
}

fn link_exists(conn: &Connection, code: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM links WHERE code = ?1", params![code], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn count_clicks(conn: &Connection, code: &str) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM clicks WHERE link_code = ?1",
        params![code],
        |r| r.get(0),
    )?;
    Ok(to_u64(n))
}

fn link_not_found(code: &str) -> Error {
    Error::NotFound(format!("link `{code}`"))
}

fn map_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        code: row.get(0)?,
        owner_id: UserId(row.get(1)?),
        destination_url: row.get(2)?,
        target_username: row.get(3)?,
        target_chat_id: row.get::<_, Option<i64>>(4)?.map(ChatId),
        target_chat_username: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_click(row: &Row<'_>) -> rusqlite::Result<ClickEvent> {
    Ok(ClickEvent {
        id: row.get(0)?,
        link_code: row.get(1)?,
        clicker_id: UserId(row.get(2)?),
        clicker_username: row.get(3)?,
        clicker_first_name: row.get(4)?,
        clicker_language: row.get(5)?,
        source: row.get(6)?,
        source_chat_id: row.get::<_, Option<i64>>(7)?.map(ChatId),
        clicked_at: row.get(8)?,
    })
}
