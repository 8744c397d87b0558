//! Telegram HTML reply formatting.

use crate::{
    storage::models::{ClickStats, Link, LinkSummary},
    utils::display_timestamp,
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `https://t.me/<bot>?start=<code>[-<source>]`
pub fn deep_link(bot_username: &str, code: &str, source: Option<&str>) -> String {
    match source {
        Some(src) => format!("https://t.me/{bot_username}?start={code}-{src}"),
        None => format!("https://t.me/{bot_username}?start={code}"),
    }
}

/// Short human label for a link's destination: `@name` for Telegram targets,
/// otherwise the URL without its scheme.
pub fn destination_label(link: &Link) -> String {
    if let Some(name) = &link.target_username {
        return format!("@{name}");
    }
    let url = link.destination_url.as_str();
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

pub fn welcome_text() -> String {
    [
        "👋 <b>Welcome to Link Tracker Bot!</b>",
        "",
        "/addlink &lt;url or @username&gt; - create a tracked link",
        "/mylinks - list your links",
        "/stats &lt;code&gt; - statistics for one link",
        "/export - CSV of all clicks on your links",
        "/export &lt;code&gt; - clicker report and summary for one link",
        "/activity - group activity of people who clicked your links",
        "/activity group &lt;@chat&gt; - everything logged in a group your links target",
        "/deletelink - delete a tracked link",
    ]
    .join("\n")
}

pub fn link_created_text(link: &Link, bot_username: &str) -> String {
    let mut out = String::new();
    out.push_str("✅ <b>Tracked link created</b>\n\n");
    out.push_str(&format!(
        "Destination: {}\n",
        escape_html(&link.destination_url)
    ));
    out.push_str(&format!(
        "Link: <code>{}</code>\n",
        escape_html(&deep_link(bot_username, &link.code, None))
    ));
    out.push_str(&format!(
        "With a source tag: <code>{}</code>\n",
        escape_html(&deep_link(bot_username, &link.code, Some("facebook")))
    ));
    if link.target_chat_id.is_some() {
        out.push_str("\nMessages of clickers in the target group are tracked (/activity).");
    }
    out
}

/// `/mylinks` list body. Stops adding lines before `max_len` bytes and notes how many
/// links were left out.
pub fn link_list_text(links: &[LinkSummary], bot_username: &str, max_len: usize) -> String {
    let mut out = format!("🔗 <b>Your links</b> ({})\n\n", links.len());
    for (idx, item) in links.iter().enumerate() {
        let line = format!(
            "• <code>{}</code> {} - {} clicks\n  {}\n",
            escape_html(&item.link.code),
            escape_html(&destination_label(&item.link)),
            item.clicks,
            escape_html(&deep_link(bot_username, &item.link.code, None)),
        );
        let footer = format!("…and {} more\n", links.len() - idx);
        if out.len() + line.len() + footer.len() > max_len {
            out.push_str(&footer);
            break;
        }
        out.push_str(&line);
    }
    out.push_str("\nTap a link for details.");
    out
}

/// Per-link statistics. The source list stops before `max_len` bytes, noting how
/// many sources were left out; every line is closed HTML on its own.
pub fn stats_text(
    link: &Link,
    stats: &ClickStats,
    sources: &[(Option<String>, u64)],
    activity: u64,
    max_len: usize,
) -> String {
    let mut out = format!(
        "📊 <b>Statistics for</b> <code>{}</code>\n",
        escape_html(&link.code)
    );
    out.push_str(&format!(
        "Destination: {}\n",
        escape_html(&link.destination_url)
    ));
    out.push_str(&format!("Created: {}\n\n", display_timestamp(link.created_at)));
    out.push_str(&format!("Total clicks: <b>{}</b>\n", stats.total_clicks));
    out.push_str(&format!("Unique clickers: <b>{}</b>\n", stats.unique_clickers));
    match (stats.first_click_at, stats.last_click_at) {
        (Some(first), Some(last)) => {
            out.push_str(&format!("First click: {}\n", display_timestamp(first)));
            out.push_str(&format!("Last click: {}\n", display_timestamp(last)));
        }
        _ => out.push_str("No clicks yet.\n"),
    }
    if link.target_chat_id.is_some() || link.target_username.is_some() {
        out.push_str(&format!("Group activity records: {activity}\n"));
    }
    if !sources.is_empty() {
        out.push_str("\n<b>Clicks by source</b>\n");
        for (idx, (source, n)) in sources.iter().enumerate() {
            let line = format!(
                "• {}: {n}\n",
                escape_html(source.as_deref().unwrap_or("direct"))
            );
            let footer = format!("…and {} more sources\n", sources.len() - idx);
            if out.len() + line.len() + footer.len() > max_len {
                out.push_str(&footer);
                break;
            }
            out.push_str(&line);
        }
    }
    out
}
