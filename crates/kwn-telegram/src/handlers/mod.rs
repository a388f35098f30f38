//! Operator menu handlers.
//!
//! Every update is checked against the ACL before it reaches a handler.

use std::{fmt::Display, sync::Arc};

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{info, warn};

use kwn_core::{domain::UserId, security::is_authorized};

use crate::router::AppState;

mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user = msg.from();
    let user_id = user.map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.acl_user_ids) {
        info!(
            user_id = user_id.map(|u| u.0),
            username = user.and_then(|u| u.username.as_deref()),
            "access denied"
        );
        let sent = bot.send_message(msg.chat.id, "Access denied.").await;
        warn_on_err("send access denial", sent);
        return Ok(());
    }

    let is_command = msg.text().is_some_and(|t| t.starts_with('/'));
    if is_command {
        return commands::handle_command(bot, msg, state).await;
    }
    Ok(())
}

/// Log a failed best-effort Telegram call and keep handling the update.
pub(crate) fn warn_on_err<T, E: Display>(action: &str, res: std::result::Result<T, E>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(action, error = %e, "telegram call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_calls_are_reported_not_propagated() {
        assert_eq!(warn_on_err::<_, String>("send", Ok(3)), Some(3));
        assert_eq!(warn_on_err::<u8, _>("delete", Err("message not found")), None);
    }
}
