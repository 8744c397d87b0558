//! CSV / text reports sent to link owners as chat documents.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::{
    domain::UserId,
    link_service::LinkService,
    ports::ChatDirectory,
    storage::models::{ActivityExportRow, Group, Link},
    utils::{clip_chars, display_timestamp},
    Result,
};

/// Join status when the link has no target chat or the lookup fails.
const UNKNOWN_JOIN_STATUS: &str = "unknown";

/// Message previews in the activity CSV are shortened to this many characters.
const ACTIVITY_PREVIEW_CHARS: usize = 100;

pub const CLICKS_HEADER: [&str; 4] = ["link_id", "destination_url", "clicker_id", "timestamp"];

const CLICKERS_HEADER: [&str; 7] = [
    "user_id",
    "first_name",
    "username",
    "language",
    "first_click",
    "activity_count",
    "join_status",
];

const ACTIVITY_HEADER: [&str; 9] = [
    "user_id",
    "chat_id",
    "message_id",
    "link_id",
    "timestamp",
    "username",
    "chat_username",
    "chat_title",
    "message_preview",
];

#[derive(Debug, Serialize)]
struct ClickCsvRow<'a> {
    link_id: &'a str,
    destination_url: &'a str,
    clicker_id: i64,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ClickerCsvRow {
    user_id: i64,
    first_name: String,
    username: String,
    language: String,
    first_click: String,
    activity_count: u64,
    join_status: &'static str,
}

#[derive(Debug, Serialize)]
struct ActivityCsvRow {
    user_id: i64,
    chat_id: i64,
    message_id: Option<i32>,
    link_id: String,
    timestamp: String,
    username: String,
    chat_username: String,
    chat_title: String,
    message_preview: String,
}

/// A generated report ready to be sent as a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Number of data rows (header excluded).
    pub rows: usize,
}

fn csv_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serialize `rows` under an explicit header. The header is written even when
/// there are no rows.
fn write_csv<T: Serialize>(header: &[&str], rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Every click on links owned by `owner_id`, in click order (`clicks.csv`).
pub async fn export_clicks(svc: &LinkService, owner_id: UserId) -> Result<Report> {
    let clicks = svc.links().clicks_for_owner(owner_id).await?;
    let rows = clicks.len();
    let bytes = write_csv(
        &CLICKS_HEADER,
        clicks.iter().map(|c| ClickCsvRow {
            link_id: &c.link_code,
            destination_url: &c.destination_url,
            clicker_id: c.clicker_id.0,
            timestamp: csv_timestamp(c.clicked_at),
        }),
    )?;
    Ok(Report {
        file_name: "clicks.csv".to_string(),
        bytes,
        rows,
    })
}

/// One row per distinct clicker with their activity count and whether they
/// joined the link's target chat (`clicks_<code>.csv`).
pub async fn unique_clickers_csv(
    svc: &LinkService,
    directory: &dyn ChatDirectory,
    link: &Link,
) -> Result<Report> {
    let clickers = svc.links().unique_clickers(&link.code).await?;
    let activity: HashMap<UserId, u64> = svc
        .data()
        .activity_counts_by_user(&link.code)
        .await?
        .into_iter()
        .collect();

    let mut csv_rows = Vec::with_capacity(clickers.len());
    for c in clickers {
        let join_status = match link.target_chat_id {
            Some(chat) => match directory.member_status(chat, c.user_id).await {
                Ok(status) => status.as_str(),
                Err(e) => {
                    debug!(chat = chat.0, user = c.user_id.0, error = %e, "join status lookup failed");
                    UNKNOWN_JOIN_STATUS
                }
            },
            None => UNKNOWN_JOIN_STATUS,
        };
        csv_rows.push(ClickerCsvRow {
            user_id: c.user_id.0,
            first_name: c.first_name.unwrap_or_default(),
            username: c.username.unwrap_or_default(),
            language: c.language_code.unwrap_or_default(),
            first_click: csv_timestamp(c.first_click_at),
            activity_count: activity.get(&c.user_id).copied().unwrap_or(0),
            join_status,
        });
    }

    let rows = csv_rows.len();
    let bytes = write_csv(&CLICKERS_HEADER, csv_rows)?;
    Ok(Report {
        file_name: format!("clicks_{}.csv", link.code),
        bytes,
        rows,
    })
}

/// Plain-text summary: totals, first/last click and clicks by source (`summary_<code>.txt`).
pub async fn summary_text(svc: &LinkService, link: &Link) -> Result<Report> {
    let stats = svc.links().click_stats(&link.code).await?;
    let sources = svc.links().source_breakdown(&link.code).await?;
    let activity = svc.data().count_activity_for_link(&link.code).await?;

    let mut out = String::new();
    out.push_str(&format!("Click summary for {}\n", link.code));
    out.push_str(&format!("Destination: {}\n", link.destination_url));
    out.push_str(&format!("Created: {}\n\n", display_timestamp(link.created_at)));
    out.push_str(&format!("Total clicks: {}\n", stats.total_clicks));
    out.push_str(&format!("Unique users: {}\n", stats.unique_clickers));
    if let Some(first) = stats.first_click_at {
        out.push_str(&format!("First click: {}\n", display_timestamp(first)));
    }
    if let Some(last) = stats.last_click_at {
        out.push_str(&format!("Last click: {}\n", display_timestamp(last)));
    }
    out.push_str(&format!("Group activity records: {activity}\n"));

    out.push_str("\nClicks by source:\n");
    if sources.is_empty() {
        out.push_str("- (no clicks yet)\n");
    }
    for (source, n) in &sources {
        out.push_str(&format!("- {}: {n}\n", source.as_deref().unwrap_or("direct")));
    }

    Ok(Report {
        file_name: format!("summary_{}.txt", link.code),
        rows: sources.len(),
        bytes: out.into_bytes(),
    })
}

fn activity_report(file_name: String, records: Vec<ActivityExportRow>) -> Result<Report> {
    let rows = records.len();
    let bytes = write_csv(
        &ACTIVITY_HEADER,
        records.into_iter().map(|a| ActivityCsvRow {
            user_id: a.user_id.0,
            chat_id: a.group_id.0,
            message_id: a.message_id.map(|m| m.0),
            link_id: a.link_code.unwrap_or_default(),
            timestamp: csv_timestamp(a.created_at),
            username: a.username.unwrap_or_default(),
            chat_username: a.group_username.unwrap_or_default(),
            chat_title: a.group_title.unwrap_or_default(),
            message_preview: a
                .message_preview
                .map(|p| clip_chars(&p, ACTIVITY_PREVIEW_CHARS))
                .unwrap_or_default(),
        }),
    )?;
    Ok(Report {
        file_name,
        bytes,
        rows,
    })
}

/// Group activity attributed to a link, newest first (`activity_<code>.csv`).
pub async fn activity_csv(svc: &LinkService, link: &Link) -> Result<Report> {
    let records = svc.data().activity_export_rows(&link.code).await?;
    activity_report(format!("activity_{}.csv", link.code), records)
}

/// Everything logged in one group, including messages not tied to a link
/// (empty `link_id`), newest first (`activity_group_<chat_id>.csv`).
pub async fn group_activity_csv(svc: &LinkService, group: &Group) -> Result<Report> {
    let records = svc.data().group_activity_export_rows(group.id).await?;
    activity_report(format!("activity_group_{}.csv", group.id.0), records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::test_support::MapDirectory,
        config::ActivityScope,
        domain::{ChatId, ChatKind, ChatProfile, MemberStatus, MessageId, UserProfile},
        link_service::ClickSource,
        messaging::types::GroupMessage,
        shortcode::RandomCodeGenerator,
        storage::{DataStore, LinkStore},
    };

    async fn service(dir: &tempfile::TempDir) -> LinkService {
        let links = LinkStore::open(dir.path().join("links.db")).await.unwrap();
        let data = DataStore::open(dir.path().join("data.db")).await.unwrap();
        LinkService::new(
            links,
            data,
            Box::new(RandomCodeGenerator::new(6)),
            8,
            ActivityScope::Tracked,
        )
    }

    fn user(id: i64) -> UserProfile {
        UserProfile {
            id: UserId(id),
            username: Some(format!("user{id}")),
            first_name: format!("User, {id}"),
            last_name: None,
            language_code: Some("en".to_string()),
            is_bot: false,
        }
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn export_clicks_has_one_row_per_click_on_owned_links() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let a = svc.create_link(UserId(42), "https://example.com/a?x=1,2").await.unwrap();
        let b = svc.create_link(UserId(42), "https://example.com/b").await.unwrap();
        let other = svc.create_link(UserId(7), "https://example.com/c").await.unwrap();
        for (code, clicker) in [(&a.code, 1), (&b.code, 2), (&a.code, 3), (&other.code, 1)] {
            svc.record_click(code, user(clicker), ClickSource::default())
                .await
                .unwrap();
        }

        let report = export_clicks(&svc, UserId(42)).await.unwrap();
        assert_eq!(report.file_name, "clicks.csv");
        assert_eq!(report.rows, 3);
        let lines = lines(&report.bytes);
        assert_eq!(lines[0], "link_id,destination_url,clicker_id,timestamp");
        assert_eq!(lines.len(), 4);
        // Comma inside the URL forces quoting.
        assert!(lines[1].starts_with(&format!("{},\"https://example.com/a?x=1,2\",1,", a.code)));
        assert!(lines[2].starts_with(&format!("{},https://example.com/b,2,", b.code)));
    }

    #[tokio::test]
    async fn export_clicks_without_links_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let report = export_clicks(&svc, UserId(1)).await.unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(lines(&report.bytes), vec![CLICKS_HEADER.join(",")]);
    }

    #[tokio::test]
    async fn per_link_reports_include_activity_and_sources() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let link = svc.create_link(UserId(42), "@rustchat").await.unwrap();
        let tagged = ClickSource {
            tag: Some("fb".to_string()),
            chat_id: None,
        };
        svc.record_click(&link.code, user(1), tagged.clone()).await.unwrap();
        svc.record_click(&link.code, user(1), ClickSource::default()).await.unwrap();
        svc.record_click(&link.code, user(2), tagged).await.unwrap();

        let chat = ChatProfile {
            id: ChatId(-100),
            kind: ChatKind::Supergroup,
            title: Some("Rust Chat".to_string()),
            username: Some("rustchat".to_string()),
        };
        let link = svc.set_target_chat(&link.code, &chat).await.unwrap();
        let msg = GroupMessage {
            chat,
            from: user(1),
            message_id: MessageId(9),
            text: Some("hello there".to_string()),
        };
        svc.observe_group_message(&msg).await.unwrap();
        svc.observe_group_message(&msg).await.unwrap();

        // User 2 cannot be looked up, which reads as unknown.
        let mut directory = MapDirectory::default();
        directory
            .members
            .insert((ChatId(-100), UserId(1)), MemberStatus::Member);
        let clickers = unique_clickers_csv(&svc, &directory, &link).await.unwrap();
        assert_eq!(clickers.file_name, format!("clicks_{}.csv", link.code));
        let rows = lines(&clickers.bytes);
        assert_eq!(rows[0], CLICKERS_HEADER.join(","));
        assert!(rows[0].ends_with(",activity_count,join_status"));
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("1,\"User, 1\",user1,en,"), "{}", rows[1]);
        assert!(rows[1].ends_with(",2,member"), "{}", rows[1]);
        assert!(rows[2].ends_with(",0,unknown"), "{}", rows[2]);

        let summary = summary_text(&svc, &link).await.unwrap();
        let text = String::from_utf8(summary.bytes).unwrap();
        assert!(text.contains("Total clicks: 3"));
        assert!(text.contains("Unique users: 2"));
        assert!(text.contains("- fb: 2\n- direct: 1"));
        assert!(text.contains("Group activity records: 2"));

        let activity = activity_csv(&svc, &link).await.unwrap();
        assert_eq!(activity.rows, 2);
        let rows = lines(&activity.bytes);
        assert_eq!(rows[0], ACTIVITY_HEADER.join(","));
        assert!(rows[1].starts_with(&format!("1,-100,9,{},", link.code)));
        assert!(rows[1].ends_with(",user1,rustchat,Rust Chat,hello there"));
    }

    #[tokio::test]
    async fn url_links_have_unknown_join_status() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let link = svc.create_link(UserId(42), "https://example.com").await.unwrap();
        svc.record_click(&link.code, user(1), ClickSource::default())
            .await
            .unwrap();

        let mut directory = MapDirectory::default();
        directory
            .members
            .insert((ChatId(-100), UserId(1)), MemberStatus::Member);
        let report = unique_clickers_csv(&svc, &directory, &link).await.unwrap();
        let rows = lines(&report.bytes);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].ends_with(",0,unknown"), "{}", rows[1]);
    }
}
