//! SQLite storage layer.
//!
//! Two independent databases: [`LinkStore`] (links + click events) and
//! [`DataStore`] (users, groups, members, activity). Connections are never held
//! globally; every operation opens a configured connection on the blocking pool
//! and drops it when the operation returns.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rusqlite::Connection;

use crate::{errors::Error, Result};

mod data;
mod links;
pub mod models;
mod schema;

pub use data::DataStore;
pub use links::LinkStore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to one SQLite file.
#[derive(Clone, Debug)]
pub struct Database {
    path: Arc<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file and apply `migrate`.
    pub async fn open(
        path: impl Into<PathBuf>,
        migrate: fn(&Connection) -> Result<()>,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self {
            path: Arc::new(path),
        };
        db.call(move |conn| migrate(conn)).await?;
        Ok(db)
    }

    /// Run `f` against a freshly opened connection on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let mut conn = connect(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::External(format!("sqlite task join failed: {e}")))?
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// `Option<T>` for single-row queries where "no rows" is not an error.
pub(crate) trait OptionalRow<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalRow<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
