use std::{env, path::PathBuf};

use tracing::debug;

use crate::{errors::Error, Result};

/// Which group messages are recorded as activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityScope {
    /// Only senders who clicked a tracked link targeting the chat.
    Tracked,
    /// Every observed text message, attributed to a link when possible.
    All,
}

impl ActivityScope {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "tracked" => Ok(ActivityScope::Tracked),
            "all" => Ok(ActivityScope::All),
            other => Err(Error::Config(format!(
                "ACTIVITY_SCOPE must be `tracked` or `all`, got `{other}`"
            ))),
        }
    }
}

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_username: Option<String>,
    /// MTProto credentials. Accepted for deployment compatibility; the Bot API
    /// transport does not need them.
    pub api_id: Option<String>,
    pub api_hash: Option<String>,

    // Storage
    pub db_path: PathBuf,
    pub data_db_path: PathBuf,

    // Behavior
    pub activity_scope: ActivityScope,
    pub short_code_length: usize,
    pub short_code_max_attempts: usize,

    // Telegram limits
    pub telegram_safe_limit: usize,
    pub button_label_max_length: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing environment wins over `.env`.
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let bot_token = get("BOT_TOKEN").ok_or_else(|| {
            Error::Config("BOT_TOKEN environment variable is required".to_string())
        })?;

        let bot_username = get("BOT_USERNAME").map(|u| u.trim().trim_start_matches('@').to_string());
        let api_id = get("API_ID");
        let api_hash = get("API_HASH");

        let db_path = PathBuf::from(get("DB_PATH").unwrap_or("link_tracker.db".to_string()));
        let data_db_path = PathBuf::from(get("DATA_DB_PATH").unwrap_or("data.db".to_string()));
        if db_path == data_db_path {
            return Err(Error::Config(
                "DB_PATH and DATA_DB_PATH must point to different files".to_string(),
            ));
        }

        let activity_scope = ActivityScope::parse(&get("ACTIVITY_SCOPE").unwrap_or_default())?;

        let short_code_length = parse_usize(&get, "SHORT_CODE_LENGTH")?
            .unwrap_or(6)
            .clamp(4, 32);
        let short_code_max_attempts = parse_usize(&get, "SHORT_CODE_MAX_ATTEMPTS")?
            .unwrap_or(8)
            .max(1);

        let telegram_safe_limit = parse_usize(&get, "TELEGRAM_SAFE_LIMIT")?
            .unwrap_or(4000)
            .clamp(200, 4096);
        let button_label_max_length = parse_usize(&get, "BUTTON_LABEL_MAX_LENGTH")?
            .unwrap_or(40)
            .max(8);

        Ok(Self {
            bot_token,
            bot_username,
            api_id,
            api_hash,
            db_path,
            data_db_path,
            activity_scope,
            short_code_length,
            short_code_max_attempts,
            telegram_safe_limit,
            button_label_max_length,
        })
    }
}

fn parse_usize(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got `{raw}`")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
