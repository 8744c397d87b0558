//! Validation and normalization of link destinations.
//!
//! Accepted inputs:
//! - `http://…` / `https://…` URLs
//! - `t.me/<name>` / `telegram.me/<name>` (scheme optional)
//! - `@<name>` or a bare Telegram username

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::{errors::Error, Result};

const TELEGRAM_HOSTS: &[&str] = &["t.me", "www.t.me", "telegram.me", "www.telegram.me"];

/// Paths on `t.me` that are not public usernames.
const RESERVED_PATHS: &[&str] = &["joinchat", "addstickers", "share", "proxy", "socks", "c", "s"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    /// URL the tracked link opens.
    pub url: String,
    /// Public Telegram username when the destination is a `t.me/<name>` link.
    pub telegram_username: Option<String>,
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").expect("valid regex"))
}

pub fn is_valid_username(name: &str) -> bool {
    username_re().is_match(name)
}

pub fn parse_destination(raw: &str) -> Result<Destination> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidUrl("destination is empty".to_string()));
    }

    if let Some(name) = raw.strip_prefix('@') {
        return telegram_destination(name);
    }
    if is_valid_username(raw) {
        return telegram_destination(raw);
    }

    let lower = raw.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else if lower.contains("://") || lower.starts_with("javascript:") || lower.starts_with("data:")
    {
        return Err(Error::InvalidUrl(
            "only http:// and https:// links are supported".to_string(),
        ));
    } else if lower.contains('.') && !lower.contains(char::is_whitespace) {
        format!("https://{raw}")
    } else {
        return Err(Error::InvalidUrl(format!("`{raw}` is not a URL or @username")));
    };

    let url = Url::parse(&candidate).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidUrl("URL has no host".to_string()))?
        .to_ascii_lowercase();

    let telegram_username = if TELEGRAM_HOSTS.contains(&host.as_str()) {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|first| !RESERVED_PATHS.contains(&first.to_ascii_lowercase().as_str()))
            .filter(|first| is_valid_username(first))
            .map(str::to_string)
    } else {
        None
    };

    Ok(Destination {
        url: candidate,
        telegram_username,
    })
}

fn telegram_destination(name: &str) -> Result<Destination> {
    if !is_valid_username(name) {
        return Err(Error::InvalidUrl(format!("`{name}` is not a valid Telegram username")));
    }
    Ok(Destination {
        url: format!("https://t.me/{name}"),
        telegram_username: Some(name.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_web_urls_are_kept_verbatim() {
        let d = parse_destination(" https://example.com ").unwrap();
        assert_eq!(d.url, "https://example.com");
        assert_eq!(d.telegram_username, None);

        let d = parse_destination("example.com/page?a=1").unwrap();
        assert_eq!(d.url, "https://example.com/page?a=1");
    }

    #[test]
    fn telegram_forms_resolve_username() {
        for input in ["@rustlang", "rustlang", "t.me/rustlang", "https://t.me/rustlang"] {
            let d = parse_destination(input).unwrap();
            assert_eq!(d.telegram_username.as_deref(), Some("rustlang"), "{input}");
        }
        assert_eq!(parse_destination("@rustlang").unwrap().url, "https://t.me/rustlang");

        let invite = parse_destination("https://t.me/joinchat/AAAA").unwrap();
        assert_eq!(invite.telegram_username, None);
    }

    #[test]
    fn malformed_destinations_are_rejected() {
        for input in ["", "   ", "ftp://example.com", "javascript:alert(1)", "@ab", "not a url"] {
            assert!(
                matches!(parse_destination(input), Err(Error::InvalidUrl(_))),
                "{input:?} should be rejected"
            );
        }
    }
}
