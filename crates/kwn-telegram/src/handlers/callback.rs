use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};

use kwn_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    security::is_authorized,
};

use super::{
    commands::{send_menu, set_paused, status_html, trigger_run},
    warn_on_err,
};
use crate::router::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MenuAction {
    StartNotifier,
    StopNotifier,
    RunNow,
    Status,
}

/// Parse `menu:{name}` callback data.
fn parse_menu_action(data: &str) -> Option<MenuAction> {
    let name = data.strip_prefix("menu:")?;
    match name {
        "start_notifier" => Some(MenuAction::StartNotifier),
        "stop_notifier" => Some(MenuAction::StopNotifier),
        "run_now" => Some(MenuAction::RunNow),
        "status" => Some(MenuAction::Status),
        _ => None,
    }
}

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = UserId(q.from.id.0 as i64);
    let data = q.data.clone().unwrap_or_default();

    if !is_authorized(Some(user_id), &state.cfg.acl_user_ids) {
        info!(user_id = user_id.0, "access denied (callback)");
        answer(&state, &cb_id, Some("Access denied")).await;
        return Ok(());
    }

    let Some(message) = q.message.as_ref() else {
        answer(&state, &cb_id, None).await;
        return Ok(());
    };
    let chat_id = ChatId(message.chat.id.0);
    let menu_msg = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };

    let Some(action) = parse_menu_action(&data) else {
        answer(&state, &cb_id, Some("Unknown action")).await;
        return Ok(());
    };

    match action {
        MenuAction::StartNotifier | MenuAction::StopNotifier => {
            let text = set_paused(&state, action == MenuAction::StopNotifier);
            answer(&state, &cb_id, Some(text)).await;
        }
        MenuAction::RunNow => {
            let text = trigger_run(&state).await;
            answer(&state, &cb_id, Some(text)).await;
        }
        MenuAction::Status => {
            answer(&state, &cb_id, None).await;
            let html = status_html(&state).await;
            if let Err(e) = state.messenger.send_html(chat_id, &html).await {
                warn!(error = %e, "failed to send status");
            }
            return Ok(());
        }
    }

    // Replace the menu so the toggle button reflects the new state.
    warn_on_err("delete menu", state.messenger.delete_message(menu_msg).await);
    send_menu(&state, chat_id).await;
    Ok(())
}

async fn answer(state: &AppState, callback_id: &str, text: Option<&str>) {
    if let Err(e) = state.messenger.answer_callback_query(callback_id, text).await {
        warn!(error = %e, "failed to answer callback query");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_callback_data_round_trips_through_parser() {
        assert_eq!(parse_menu_action("menu:start_notifier"), Some(MenuAction::StartNotifier));
        assert_eq!(parse_menu_action("menu:stop_notifier"), Some(MenuAction::StopNotifier));
        assert_eq!(parse_menu_action("menu:run_now"), Some(MenuAction::RunNow));
        assert_eq!(parse_menu_action("menu:status"), Some(MenuAction::Status));
        assert_eq!(parse_menu_action("menu:unknown"), None);
        assert_eq!(parse_menu_action("askuser:1:2"), None);
    }
}
