use tracing::{trace, warn};

use crate::messaging::types::GroupMessage;

use super::BotContext;

/// Passive group monitoring. Never replies; failures are only logged.
pub(super) async fn observe(ctx: &BotContext, msg: &GroupMessage) {
    match ctx.links.observe_group_message(msg).await {
        Ok(0) => trace!(chat_id = msg.chat.id.0, "group message not attributed"),
        Ok(_) => {}
        Err(e) => warn!(
            chat_id = msg.chat.id.0,
            user = msg.from.id.0,
            error = %e,
            "failed to record group activity"
        ),
    }
}
