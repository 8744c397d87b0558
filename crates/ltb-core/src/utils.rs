use chrono::{DateTime, Utc};

// ============== Timestamp Helpers ==============

/// Timestamp as shown in replies and exports (`2024-05-01 12:30:00 UTC`).
pub fn display_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

// ============== Text Helpers ==============

/// Shorten to at most `max_len` characters, the `...` marker included.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len.saturating_sub(3)).collect::<String>();
    out.push_str("...");
    out
}

/// Keep at most `max_len` characters, no marker.
pub fn clip_chars(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

/// Normalize a deep-link source tag: ASCII letters, digits and `_` only,
/// lowercased, at most 32 characters. Returns `None` when nothing is left.
pub fn sanitize_source_tag(raw: &str) -> Option<String> {
    let tag: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(32)
        .collect::<String>()
        .to_ascii_lowercase();
    (!tag.is_empty()).then_some(tag)
}

/// Split `text` into chunks of at most `limit` bytes, breaking on line boundaries.
///
/// A single line longer than `limit` is cut on a char boundary.
pub fn split_lines_into_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in text.split_inclusive('\n') {
        if chunk.len() + line.len() > limit && !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }
        if line.len() <= limit {
            chunk.push_str(line);
            continue;
        }
        for c in line.chars() {
            if chunk.len() + c.len_utf8() > limit {
                out.push(std::mem::take(&mut chunk));
            }
            chunk.push(c);
        }
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}
