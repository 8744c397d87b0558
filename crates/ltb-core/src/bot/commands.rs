use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, ChatKind, UserId},
    errors::Error,
    export,
    formatting::{
        deep_link, destination_label, escape_html, link_created_text, link_list_text, stats_text,
        welcome_text,
    },
    link_service::{ClickSource, DeletedLink},
    messaging::types::{ChatAction, Command, InlineButton, InlineKeyboard, OutgoingDocument},
    storage::models::Link,
    Result,
};

use super::{
    deeplink::parse_start_payload, message_limit, reply_error, send_html_split, BotContext,
};

const ADDLINK_USAGE: &str = "Usage: /addlink <url or @username>\n\
                             Example: /addlink https://example.com";
const STATS_USAGE: &str = "Usage: /stats <code>\nSee /mylinks for your codes.";
const ACTIVITY_GROUP_USAGE: &str = "Usage: /activity group <@username or chat id>";

/// Telegram allows 100 buttons per keyboard; keep well under it.
const MAX_PICKER_BUTTONS: usize = 50;

/// Split `/cmd@bot args` into `(cmd, args)`.
///
/// Returns `None` for non-commands and for commands addressed to another bot.
pub fn parse_command(text: &str, bot_username: &str) -> Option<(String, String)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let mut name_parts = first.trim_start_matches('/').splitn(2, '@');
    let name = name_parts.next().unwrap_or("").to_lowercase();
    if let Some(addressee) = name_parts.next() {
        if !addressee.eq_ignore_ascii_case(bot_username) {
            return None;
        }
    }
    if name.is_empty() {
        return None;
    }
    Some((name, rest))
}

pub(super) async fn handle_command(ctx: &BotContext, cmd: Command) {
    if let Err(e) = ctx.links.track_user(&cmd.from).await {
        warn!(user = cmd.from.id.0, error = %e, "failed to track user");
    }
    debug!(user = cmd.from.id.0, command = %cmd.name, "command received");

    let result = match cmd.name.as_str() {
        "start" => handle_start(ctx, &cmd).await,
        "help" => {
            send_html_split(ctx, cmd.chat_id, &welcome_text()).await;
            Ok(())
        }
        "addlink" => handle_addlink(ctx, &cmd).await,
        "mylinks" => handle_mylinks(ctx, &cmd).await,
        "stats" => handle_stats(ctx, &cmd).await,
        "export" => handle_export(ctx, &cmd).await,
        "activity" => handle_activity(ctx, &cmd).await,
        "deletelink" => handle_deletelink(ctx, &cmd).await,
        _ => {
            handle_unknown(ctx, &cmd).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        reply_error(ctx, cmd.chat_id, &e).await;
    }
}

async fn handle_start(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let args = cmd.args.trim();
    if args.is_empty() {
        send_html_split(ctx, cmd.chat_id, &welcome_text()).await;
        return Ok(());
    }

    let Some(payload) = parse_start_payload(args) else {
        return Err(Error::InvalidArgument("Invalid link format.".to_string()));
    };

    let link = match ctx.links.get_link(&payload.code).await {
        Ok(link) => link,
        Err(Error::NotFound(_)) => {
            send_html_split(ctx, cmd.chat_id, "❌ Link not found or expired.").await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let source = ClickSource {
        tag: payload.source,
        chat_id: (cmd.chat_kind != ChatKind::Private).then_some(cmd.chat_id),
    };
    // The redirect is still shown when the click cannot be stored.
    if let Err(e) = ctx.links.record_click(&link.code, cmd.from.clone(), source).await {
        warn!(code = %link.code, error = %e, "failed to record click");
    }

    let label = destination_label(&link);
    let html = format!(
        "🔗 <b>Opening {}</b>\n\n<a href=\"{}\">Click here to open</a>",
        escape_html(&label),
        escape_html(&link.destination_url)
    );
    let button = InlineButton::url(format!("Open {label} 🚀"), link.destination_url.clone())
        .truncated(ctx.cfg.button_label_max_length);
    ctx.messenger
        .send_inline_keyboard(cmd.chat_id, &html, InlineKeyboard::single(button))
        .await?;
    Ok(())
}

async fn handle_addlink(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let target = cmd.args.trim();
    if target.is_empty() {
        return Err(Error::InvalidArgument(ADDLINK_USAGE.to_string()));
    }

    let mut link = ctx.links.create_link(cmd.from.id, target).await?;

    if let Some(name) = link.target_username.clone() {
        match ctx.directory.resolve_discussion_chat(&name).await {
            Ok(Some(chat)) => match ctx.links.set_target_chat(&link.code, &chat).await {
                Ok(updated) => link = updated,
                Err(e) => warn!(code = %link.code, error = %e, "failed to store target chat"),
            },
            Ok(None) => debug!(username = %name, "destination is not a group or channel"),
            Err(e) => warn!(username = %name, error = %e, "could not resolve destination chat"),
        }
    }

    send_html_split(
        ctx,
        cmd.chat_id,
        &link_created_text(&link, &ctx.bot_username),
    )
    .await;
    Ok(())
}

async fn handle_mylinks(ctx: &BotContext, cmd: &Command) -> Result<()> {
    match link_list_view(ctx, cmd.from.id).await? {
        Some((html, keyboard)) => {
            ctx.messenger
                .send_inline_keyboard(cmd.chat_id, &html, keyboard)
                .await?;
        }
        None => send_html_split(ctx, cmd.chat_id, NO_LINKS).await,
    }
    Ok(())
}

async fn handle_stats(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let code = cmd.args.trim();
    if code.is_empty() {
        return Err(Error::InvalidArgument(STATS_USAGE.to_string()));
    }
    let link = ctx.links.get_owned_link(code, cmd.from.id).await?;
    let html = link_stats_text(ctx, &link).await?;
    send_html_split(ctx, cmd.chat_id, &html).await;
    Ok(())
}

async fn handle_export(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let code = cmd.args.trim();
    if !code.is_empty() {
        let link = ctx.links.get_owned_link(code, cmd.from.id).await?;
        return send_link_report(ctx, cmd.chat_id, &link).await;
    }

    let report = export::export_clicks(&ctx.links, cmd.from.id).await?;
    if report.rows == 0 {
        send_html_split(ctx, cmd.chat_id, "📭 No clicks recorded on your links yet.").await;
        return Ok(());
    }

    let _ = ctx
        .messenger
        .send_chat_action(cmd.chat_id, ChatAction::UploadDocument)
        .await;
    let caption = format!("📊 {} clicks across your links", report.rows);
    ctx.messenger
        .send_document(
            cmd.chat_id,
            OutgoingDocument {
                file_name: report.file_name,
                bytes: report.bytes,
                caption: Some(caption),
            },
        )
        .await?;
    info!(owner = cmd.from.id.0, rows = report.rows, "click export sent");
    Ok(())
}

async fn handle_activity(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let code = cmd.args.trim();
    let mut words = code.split_whitespace();
    if words.next() == Some("group") {
        let Some(chat) = words.next() else {
            return Err(Error::InvalidArgument(ACTIVITY_GROUP_USAGE.to_string()));
        };
        return send_group_activity_report(ctx, cmd, chat).await;
    }
    if !code.is_empty() {
        let link = ctx.links.get_owned_link(code, cmd.from.id).await?;
        return send_activity_report(ctx, cmd.chat_id, &link).await;
    }

    let links = ctx.links.list_links(cmd.from.id).await?;
    if links.is_empty() {
        send_html_split(ctx, cmd.chat_id, NO_LINKS).await;
        return Ok(());
    }

    let mut buttons = Vec::new();
    for item in links.iter().take(MAX_PICKER_BUTTONS) {
        let count = ctx
            .links
            .data()
            .count_activity_for_link(&item.link.code)
            .await?;
        buttons.push(
            InlineButton::callback(
                format!("{} ({count} activities)", destination_label(&item.link)),
                format!("activity:{}", item.link.code),
            )
            .truncated(ctx.cfg.button_label_max_length),
        );
    }
    ctx.messenger
        .send_inline_keyboard(
            cmd.chat_id,
            "📊 <b>Select a link to export activity data:</b>",
            InlineKeyboard::one_per_row(buttons),
        )
        .await?;
    Ok(())
}

/// `/activity group <chat>`: all activity logged in a group one of the
/// requester's links targets, unattributed messages included.
async fn send_group_activity_report(ctx: &BotContext, cmd: &Command, chat: &str) -> Result<()> {
    let group = ctx.links.get_owned_group(chat, cmd.from.id).await?;
    let report = export::group_activity_csv(&ctx.links, &group).await?;
    if report.rows == 0 {
        send_html_split(ctx, cmd.chat_id, "📭 No activity recorded in this group yet.").await;
        return Ok(());
    }

    let _ = ctx
        .messenger
        .send_chat_action(cmd.chat_id, ChatAction::UploadDocument)
        .await;
    let name = group
        .title
        .clone()
        .or_else(|| group.username.as_ref().map(|u| format!("@{u}")))
        .unwrap_or_else(|| group.id.0.to_string());
    let caption = format!(
        "📊 Group activity for {name}\nTotal activities: {}",
        report.rows
    );
    ctx.messenger
        .send_document(
            cmd.chat_id,
            OutgoingDocument {
                file_name: report.file_name,
                bytes: report.bytes,
                caption: Some(caption),
            },
        )
        .await?;
    info!(
        owner = cmd.from.id.0,
        group = group.id.0,
        rows = report.rows,
        "group activity export sent"
    );
    Ok(())
}

async fn handle_deletelink(ctx: &BotContext, cmd: &Command) -> Result<()> {
    let code = cmd.args.trim();
    if !code.is_empty() {
        let deleted = ctx.links.delete_link(code, cmd.from.id).await?;
        send_html_split(ctx, cmd.chat_id, &deleted_text(&deleted)).await;
        return Ok(());
    }

    let links = ctx.links.list_links(cmd.from.id).await?;
    if links.is_empty() {
        send_html_split(ctx, cmd.chat_id, NO_LINKS).await;
        return Ok(());
    }
    let buttons = links
        .iter()
        .take(MAX_PICKER_BUTTONS)
        .map(|item| {
            InlineButton::callback(
                format!("🗑 {} ({})", destination_label(&item.link), item.link.code),
                format!("del:{}", item.link.code),
            )
            .truncated(ctx.cfg.button_label_max_length)
        })
        .collect();
    ctx.messenger
        .send_inline_keyboard(
            cmd.chat_id,
            "🗑 <b>Select a link to delete:</b>",
            InlineKeyboard::one_per_row(buttons),
        )
        .await?;
    Ok(())
}

async fn handle_unknown(ctx: &BotContext, cmd: &Command) {
    // Commands meant for other bots in groups are none of our business.
    if cmd.chat_kind != ChatKind::Private {
        return;
    }
    let html = format!(
        "❓ Unknown command: /{}\nUse /help to see available commands.",
        escape_html(&cmd.name)
    );
    send_html_split(ctx, cmd.chat_id, &html).await;
}

// ============== Shared with callbacks ==============

pub(super) const NO_LINKS: &str = "You have no links yet. Use /addlink to create one.";

/// `/mylinks` text and keyboard, or `None` when the user owns no links.
pub(super) async fn link_list_view(
    ctx: &BotContext,
    owner: UserId,
) -> Result<Option<(String, InlineKeyboard)>> {
    let links = ctx.links.list_links(owner).await?;
    if links.is_empty() {
        return Ok(None);
    }

    let html = link_list_text(&links, &ctx.bot_username, message_limit(ctx));
    let buttons = links
        .iter()
        .take(MAX_PICKER_BUTTONS)
        .map(|item| {
            InlineButton::callback(
                format!("{} ({})", destination_label(&item.link), item.clicks),
                format!("show:{}", item.link.code),
            )
            .truncated(ctx.cfg.button_label_max_length)
        })
        .collect();
    Ok(Some((html, InlineKeyboard::one_per_row(buttons))))
}

pub(super) async fn link_stats_text(ctx: &BotContext, link: &Link) -> Result<String> {
    let stats = ctx.links.get_stats(&link.code).await?;
    let sources = ctx.links.links().source_breakdown(&link.code).await?;
    let activity = ctx
        .links
        .data()
        .count_activity_for_link(&link.code)
        .await?;
    let link_line = format!(
        "\nLink: <code>{}</code>",
        escape_html(&deep_link(&ctx.bot_username, &link.code, None))
    );
    let budget = message_limit(ctx).saturating_sub(link_line.len());
    let mut html = stats_text(link, &stats, &sources, activity, budget);
    html.push_str(&link_line);
    Ok(html)
}

/// Unique-clicker CSV plus summary text for one link.
pub(super) async fn send_link_report(ctx: &BotContext, chat_id: ChatId, link: &Link) -> Result<()> {
    let stats = ctx.links.get_stats(&link.code).await?;
    if stats.total_clicks == 0 {
        send_html_split(ctx, chat_id, "📭 No clicks recorded for this link yet.").await;
        return Ok(());
    }

    let _ = ctx
        .messenger
        .send_chat_action(chat_id, ChatAction::UploadDocument)
        .await;
    let clickers = export::unique_clickers_csv(&ctx.links, ctx.directory.as_ref(), link).await?;
    let summary = export::summary_text(&ctx.links, link).await?;
    let label = destination_label(link);

    ctx.messenger
        .send_document(
            chat_id,
            OutgoingDocument {
                file_name: clickers.file_name,
                bytes: clickers.bytes,
                caption: Some(format!("📊 Unique clickers of {label}")),
            },
        )
        .await?;
    ctx.messenger
        .send_document(
            chat_id,
            OutgoingDocument {
                file_name: summary.file_name,
                bytes: summary.bytes,
                caption: Some("📈 Summary report".to_string()),
            },
        )
        .await?;
    Ok(())
}

pub(super) async fn send_activity_report(
    ctx: &BotContext,
    chat_id: ChatId,
    link: &Link,
) -> Result<()> {
    let report = export::activity_csv(&ctx.links, link).await?;
    if report.rows == 0 {
        send_html_split(ctx, chat_id, "📭 No activity recorded for this link yet.").await;
        return Ok(());
    }

    let _ = ctx
        .messenger
        .send_chat_action(chat_id, ChatAction::UploadDocument)
        .await;
    let caption = format!(
        "📊 Activity export for {}\nTotal activities: {}",
        destination_label(link),
        report.rows
    );
    ctx.messenger
        .send_document(
            chat_id,
            OutgoingDocument {
                file_name: report.file_name,
                bytes: report.bytes,
                caption: Some(caption),
            },
        )
        .await?;
    Ok(())
}

pub(super) fn deleted_text(deleted: &DeletedLink) -> String {
    format!(
        "🗑 Link <code>{}</code> ({}) deleted.\nRemoved {} clicks and {} activity records.",
        escape_html(&deleted.link.code),
        escape_html(&destination_label(&deleted.link)),
        deleted.clicks_removed,
        deleted.activity_removed
    )
}
