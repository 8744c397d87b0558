use tracing::error;

/// Core error type for the link tracker.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// handle failures consistently (user-facing message vs logged internal failure).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("could not generate a unique short code after {attempts} attempts")]
    GenerationExhausted { attempts: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            return Error::Constraint(e.to_string());
        }
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            return Error::NotFound("no matching row".to_string());
        }
        Error::Database(e)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    let rusqlite::Error::SqliteFailure(inner, _) = e else {
        return false;
    };
    inner.code == rusqlite::ErrorCode::ConstraintViolation
        && matches!(
            inner.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
}

impl Error {
    /// Text shown to the user for this failure.
    ///
    /// Internal failures are logged here and collapsed into a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound(what) => format!("❌ Not found: {what}"),
            Error::PermissionDenied(_) => {
                "⛔ Permission denied: only the owner of this link can do that.".to_string()
            }
            Error::InvalidArgument(hint) => format!("⚠️ {hint}"),
            Error::InvalidUrl(reason) => format!("❌ Invalid link target: {reason}"),
            Error::GenerationExhausted { .. } => {
                "❌ Could not allocate a new link code. Please try again.".to_string()
            }
            other => {
                error!(error = %other, "unexpected failure while handling update");
                "❌ An error occurred. Please try again later.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_constraint() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: Error = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Constraint(_)), "got {err:?}");
    }

    #[test]
    fn internal_errors_get_generic_message() {
        let err = Error::External("boom".to_string());
        assert!(err.user_message().contains("An error occurred"));
        assert!(!err.user_message().contains("boom"));
    }

    #[test]
    fn invalid_argument_shows_hint() {
        let err = Error::InvalidArgument("Usage: /addlink <url>".to_string());
        assert_eq!(err.user_message(), "⚠️ Usage: /addlink <url>");
    }
}
