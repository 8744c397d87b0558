use tracing::{debug, warn};

use crate::{
    formatting::{destination_label, escape_html},
    messaging::types::{CallbackQuery, InlineButton, InlineKeyboard},
    Result,
};

use super::{
    commands::{deleted_text, link_list_view, link_stats_text, send_activity_report, NO_LINKS},
    send_html_split, BotContext,
};

/// Handle an inline-keyboard press. Data is `<action>` or `<action>:<code>`.
pub(super) async fn handle_callback(ctx: &BotContext, q: CallbackQuery) {
    let (action, code) = match q.data.split_once(':') {
        Some((action, code)) => (action, code),
        None => (q.data.as_str(), ""),
    };
    debug!(user = q.from.id.0, action, code, "callback received");

    let result = match action {
        "mylinks" => show_list(ctx, &q).await,
        "show" => show_link(ctx, &q, code).await,
        "activity" => export_activity(ctx, &q, code).await,
        "del" => confirm_delete(ctx, &q, code).await,
        "delok" => delete(ctx, &q, code).await,
        "delno" => cancel_delete(ctx, &q).await,
        _ => Ok(Some("Unknown action".to_string())),
    };

    let answered = match result {
        Ok(text) => {
            ctx.messenger
                .answer_callback_query(&q.callback_id, text.as_deref(), false)
                .await
        }
        Err(e) => {
            let text = e.user_message();
            ctx.messenger
                .answer_callback_query(&q.callback_id, Some(&text), true)
                .await
        }
    };
    if let Err(e) = answered {
        warn!(error = %e, "failed to answer callback query");
    }
}

/// Replace the keyboard message in place, or send a fresh one when it is gone
/// or the messenger cannot edit.
async fn show(
    ctx: &BotContext,
    q: &CallbackQuery,
    html: &str,
    keyboard: Option<InlineKeyboard>,
) -> Result<()> {
    let message = q
        .message
        .filter(|_| ctx.messenger.capabilities().supports_edit);
    match (message, keyboard) {
        (Some(msg), Some(kb)) => ctx.messenger.edit_inline_keyboard(msg, html, kb).await,
        (Some(msg), None) => ctx.messenger.edit_html(msg, html).await,
        (None, Some(kb)) => ctx
            .messenger
            .send_inline_keyboard(q.chat_id, html, kb)
            .await
            .map(|_| ()),
        (None, None) => {
            send_html_split(ctx, q.chat_id, html).await;
            Ok(())
        }
    }
}

fn back_button() -> InlineButton {
    InlineButton::callback("⬅️ Back", "mylinks")
}

async fn show_list(ctx: &BotContext, q: &CallbackQuery) -> Result<Option<String>> {
    match link_list_view(ctx, q.from.id).await? {
        Some((html, kb)) => show(ctx, q, &html, Some(kb)).await?,
        None => show(ctx, q, NO_LINKS, None).await?,
    }
    Ok(None)
}

async fn show_link(ctx: &BotContext, q: &CallbackQuery, code: &str) -> Result<Option<String>> {
    let link = ctx.links.get_owned_link(code, q.from.id).await?;
    let html = link_stats_text(ctx, &link).await?;
    let open = InlineButton::url(
        format!("Open {} 🚀", destination_label(&link)),
        link.destination_url.clone(),
    )
    .truncated(ctx.cfg.button_label_max_length);
    let kb = InlineKeyboard::new(vec![vec![open], vec![back_button()]]);
    show(ctx, q, &html, Some(kb)).await?;
    Ok(None)
}

async fn export_activity(
    ctx: &BotContext,
    q: &CallbackQuery,
    code: &str,
) -> Result<Option<String>> {
    let link = ctx.links.get_owned_link(code, q.from.id).await?;
    send_activity_report(ctx, q.chat_id, &link).await?;
    Ok(Some("Export ready".to_string()))
}

async fn confirm_delete(ctx: &BotContext, q: &CallbackQuery, code: &str) -> Result<Option<String>> {
    let link = ctx.links.get_owned_link(code, q.from.id).await?;
    let html = format!(
        "⚠️ Delete <code>{}</code> ({})?\nAll of its clicks and activity records will be removed.",
        escape_html(&link.code),
        escape_html(&destination_label(&link))
    );
    let kb = InlineKeyboard::new(vec![vec![
        InlineButton::callback("✅ Yes, delete", format!("delok:{}", link.code)),
        InlineButton::callback("❌ Cancel", format!("delno:{}", link.code)),
    ]]);
    show(ctx, q, &html, Some(kb)).await?;
    Ok(None)
}

async fn delete(ctx: &BotContext, q: &CallbackQuery, code: &str) -> Result<Option<String>> {
    let deleted = ctx.links.delete_link(code, q.from.id).await?;
    show(ctx, q, &deleted_text(&deleted), None).await?;
    Ok(Some("Deleted".to_string()))
}

async fn cancel_delete(ctx: &BotContext, q: &CallbackQuery) -> Result<Option<String>> {
    show(ctx, q, "Deletion cancelled.", None).await?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::{
            handle_update,
            test_support::{callback, command, context, context_with, MapDirectory},
        },
        config::ActivityScope,
        domain::{MessageId, MessageRef, UserId},
        messaging::{
            fake::FakeMessenger,
            types::{ButtonAction, MessagingCapabilities},
        },
    };

    fn last_edit(fake: &FakeMessenger) -> (MessageRef, String, Option<InlineKeyboard>) {
        fake.edits.lock().unwrap().last().cloned().unwrap()
    }

    async fn link_code(ctx: &BotContext, owner: i64) -> String {
        handle_update(ctx, command(owner, "addlink", "https://example.com")).await;
        ctx.links.list_links(UserId(owner)).await.unwrap()[0]
            .link
            .code
            .clone()
    }

    #[tokio::test]
    async fn show_edits_message_with_stats_and_back_button() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(42, &format!("show:{code}"))).await;
        let (msg, html, kb) = last_edit(&fake);
        assert_eq!(msg.message_id, MessageId(500));
        assert!(html.contains("Total clicks: <b>0</b>"));
        let actions: Vec<_> = kb.unwrap().buttons().map(|b| b.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                ButtonAction::Url("https://example.com".to_string()),
                ButtonAction::Callback("mylinks".to_string()),
            ]
        );
        let answers = fake.answers.lock().unwrap().clone();
        assert_eq!(answers, vec![(format!("cb-show:{code}"), None, false)]);
    }

    #[tokio::test]
    async fn foreign_link_is_answered_with_alert() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(99, &format!("show:{code}"))).await;
        assert!(fake.edits.lock().unwrap().is_empty());
        let (_, text, alert) = fake.answers.lock().unwrap().last().cloned().unwrap();
        assert!(alert);
        assert!(text.unwrap().contains("Permission denied"));
    }

    #[tokio::test]
    async fn delete_flow_confirms_then_removes() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(42, &format!("del:{code}"))).await;
        let (_, html, kb) = last_edit(&fake);
        assert!(html.contains("Delete"));
        let actions: Vec<_> = kb.unwrap().buttons().map(|b| b.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                ButtonAction::Callback(format!("delok:{code}")),
                ButtonAction::Callback(format!("delno:{code}")),
            ]
        );
        assert!(ctx.links.links().exists(&code).await.unwrap());

        handle_update(&ctx, callback(42, &format!("delok:{code}"))).await;
        let (_, html, kb) = last_edit(&fake);
        assert!(html.contains("deleted"));
        assert!(kb.is_none());
        assert!(!ctx.links.links().exists(&code).await.unwrap());
    }

    #[tokio::test]
    async fn delete_confirmation_by_stranger_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(99, &format!("delok:{code}"))).await;
        assert!(ctx.links.links().exists(&code).await.unwrap());
        let (_, _, alert) = fake.answers.lock().unwrap().last().cloned().unwrap();
        assert!(alert);
    }

    #[tokio::test]
    async fn cancel_and_back_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(42, &format!("delno:{code}"))).await;
        assert_eq!(last_edit(&fake).1, "Deletion cancelled.");

        handle_update(&ctx, callback(42, "mylinks")).await;
        let (_, html, kb) = last_edit(&fake);
        assert!(html.contains("Your links</b> (1)"));
        assert_eq!(kb.unwrap().buttons().count(), 1);
    }

    #[tokio::test]
    async fn activity_callback_without_records_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(42, &format!("activity:{code}"))).await;
        assert!(fake.last_text().contains("No activity recorded"));
        assert_eq!(
            fake.answers.lock().unwrap().last().unwrap().1.as_deref(),
            Some("Export ready")
        );
    }

    #[tokio::test]
    async fn missing_message_falls_back_to_new_message() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, fake) = context(&dir, MapDirectory::default()).await;
        link_code(&ctx, 42).await;

        let mut q = match callback(42, "mylinks") {
            crate::messaging::types::IncomingUpdate::Callback(q) => q,
            _ => unreachable!(),
        };
        q.message = None;
        handle_callback(&ctx, q).await;
        assert!(fake.edits.lock().unwrap().is_empty());
        assert_eq!(fake.keyboards().len(), 1);
        assert_eq!(fake.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn messenger_without_edits_gets_new_messages() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = FakeMessenger::with_capabilities(MessagingCapabilities {
            supports_edit: false,
            max_message_len: 4096,
        });
        let (ctx, fake) = context_with(
            &dir,
            MapDirectory::default(),
            messenger,
            ActivityScope::Tracked,
        )
        .await;
        let code = link_code(&ctx, 42).await;

        handle_update(&ctx, callback(42, &format!("show:{code}"))).await;
        handle_update(&ctx, callback(42, &format!("delno:{code}"))).await;
        assert!(fake.edits.lock().unwrap().is_empty());
        let keyboards = fake.keyboards();
        assert_eq!(keyboards.len(), 1);
        assert_eq!(keyboards[0].buttons().count(), 2);
        assert_eq!(fake.last_text(), "Deletion cancelled.");
    }
}
