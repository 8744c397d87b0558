use rusqlite::Connection;

use crate::Result;

pub(crate) fn migrate_links(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS links (
  code TEXT PRIMARY KEY,
  owner_id INTEGER NOT NULL,
  destination_url TEXT NOT NULL,
  target_username TEXT,
  target_chat_id INTEGER,
  target_chat_username TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_owner ON links(owner_id, created_at);

CREATE TABLE IF NOT EXISTS clicks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  link_code TEXT NOT NULL REFERENCES links(code) ON DELETE CASCADE,
  clicker_id INTEGER NOT NULL,
  clicker_username TEXT,
  clicker_first_name TEXT,
  clicker_language TEXT,
  source TEXT,
  source_chat_id INTEGER,
  clicked_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clicks_link ON clicks(link_code, clicked_at);
CREATE INDEX IF NOT EXISTS idx_clicks_clicker ON clicks(clicker_id);
"#,
    )?;

    // Columns added after the first release.
    add_column_if_missing(conn, "links", "target_chat_id INTEGER")?;
    add_column_if_missing(conn, "links", "target_chat_username TEXT")?;
    add_column_if_missing(conn, "clicks", "source TEXT")?;
    add_column_if_missing(conn, "clicks", "source_chat_id INTEGER")?;

    // Indexes on migrated columns go after the columns exist.
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_links_target_chat ON links(target_chat_id);",
    )?;
    Ok(())
}

pub(crate) fn migrate_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY,
  username TEXT,
  first_name TEXT NOT NULL,
  last_name TEXT,
  language_code TEXT,
  is_bot INTEGER NOT NULL DEFAULT 0,
  first_seen_at TEXT NOT NULL,
  last_seen_at TEXT NOT NULL,
  interaction_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

CREATE TABLE IF NOT EXISTS chats (
  id INTEGER PRIMARY KEY,
  chat_type TEXT NOT NULL,
  title TEXT,
  username TEXT,
  first_seen_at TEXT NOT NULL,
  last_seen_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  username TEXT,
  first_name TEXT,
  first_seen_at TEXT NOT NULL,
  last_seen_at TEXT NOT NULL,
  message_count INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (chat_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);

CREATE TABLE IF NOT EXISTS activity (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  chat_id INTEGER NOT NULL,
  link_code TEXT,
  action_type TEXT NOT NULL,
  message_id INTEGER,
  message_preview TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_link ON activity(link_code, user_id);
CREATE INDEX IF NOT EXISTS idx_activity_chat ON activity(chat_id);
"#,
    )?;

    add_column_if_missing(conn, "activity", "message_preview TEXT")?;
    Ok(())
}

/// `ALTER TABLE .. ADD COLUMN`, tolerating a column that already exists.
fn add_column_if_missing(conn: &Connection, table: &str, coldef: &str) -> Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {coldef}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_links(&conn).unwrap();
        migrate_links(&conn).unwrap();
        migrate_data(&conn).unwrap();
        migrate_data(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('links', 'clicks', 'users', 'chats', 'members', 'activity')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn old_clicks_table_gains_new_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE clicks (id INTEGER PRIMARY KEY AUTOINCREMENT, link_code TEXT NOT NULL, \
               clicker_id INTEGER NOT NULL, clicker_username TEXT, clicker_first_name TEXT, \
               clicker_language TEXT, clicked_at TEXT NOT NULL);",
        )
        .unwrap();
        migrate_links(&conn).unwrap();

        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('clicks') \
                 WHERE name IN ('source', 'source_chat_id')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn old_links_table_gains_target_chat_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE links (code TEXT PRIMARY KEY, owner_id INTEGER NOT NULL, \
               destination_url TEXT NOT NULL, target_username TEXT, created_at TEXT NOT NULL);\
             INSERT INTO links VALUES ('abc123', 42, 'https://example.com', NULL, '2024-01-01');",
        )
        .unwrap();
        migrate_links(&conn).unwrap();
        migrate_links(&conn).unwrap();

        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('links') \
                 WHERE name IN ('target_chat_id', 'target_chat_username')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);

        let indexed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'index' AND name = 'idx_links_target_chat'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(indexed, 1);

        let kept: String = conn
            .query_row("SELECT destination_url FROM links WHERE code = 'abc123'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(kept, "https://example.com");
    }
}
