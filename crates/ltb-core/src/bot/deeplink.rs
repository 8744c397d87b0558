use crate::{shortcode::is_valid_code, utils::sanitize_source_tag};

/// Parsed `/start` payload: `<code>` or `<code>-<source>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartPayload {
    pub code: String,
    pub source: Option<String>,
}

/// Parse a deep-link payload. The code ends at the first `-`; everything after it
/// is the source tag. Returns `None` when the code part is malformed.
pub fn parse_start_payload(payload: &str) -> Option<StartPayload> {
    let payload = payload.trim();
    let (code, source) = match payload.split_once('-') {
        Some((code, rest)) => (code, sanitize_source_tag(rest)),
        None => (payload, None),
    };
    if !is_valid_code(code) {
        return None;
    }
    Some(StartPayload {
        code: code.to_string(),
        source,
    })
}
