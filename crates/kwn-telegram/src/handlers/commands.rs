use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;
use tracing::{info, warn};

use kwn_core::{
    domain::{ChatId, Filter, PollCycleResult},
    formatting::{escape_html, format_cycle_summary},
    messaging::types::{InlineButton, InlineKeyboard},
    scheduler::SchedulerStatus,
};

use crate::router::AppState;

pub(crate) const HELP_HTML: &str = "<b>Kwork notifier</b>\n\n\
New Kwork projects matching the configured filter are posted here.\n\n\
/start - menu\n\
/status - scheduler state and last poll\n\
/run - poll kwork now\n\
/pause - stop sending notifications\n\
/resume - start sending notifications again";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(crate) fn menu_keyboard(paused: bool) -> InlineKeyboard {
    let toggle = if paused {
        InlineButton::callback("start notifier", "menu:start_notifier")
    } else {
        InlineButton::callback("stop notifier", "menu:stop_notifier")
    };
    InlineKeyboard::new(vec![
        vec![InlineButton::callback("status", "menu:status")],
        vec![toggle, InlineButton::callback("poll now", "menu:run_now")],
    ])
}

fn format_interval(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 && secs >= 3600 {
        return format!("{}h", secs / 3600);
    }
    if secs % 60 == 0 && secs >= 60 {
        return format!("{}m", secs / 60);
    }
    format!("{secs}s")
}

pub(crate) fn render_status(
    status: &SchedulerStatus,
    filter: &Filter,
    last: Option<&PollCycleResult>,
) -> String {
    let state = match (status.running, status.paused) {
        (false, _) => "stopped",
        (true, true) => "paused",
        (true, false) => "running",
    };
    let categories = filter
        .categories
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![
        "📋 <b>Kwork notifier</b>".to_string(),
        format!("State: <b>{state}</b>, every {}", format_interval(status.interval)),
        format!("Categories: {}", escape_html(&categories)),
    ];
    if let Some(q) = &filter.query {
        lines.push(format!("Query: <code>{}</code>", escape_html(q)));
    }
    lines.push(format!(
        "Runs: {} started, {} dropped, {} in flight",
        status.fired, status.dropped, status.active_instances
    ));
    if let Some(at) = status.last_fired_at {
        lines.push(format!("Last trigger: {}", at.format("%Y-%m-%d %H:%M UTC")));
    }
    lines.push(String::new());
    lines.push(match last {
        Some(res) => format_cycle_summary(res),
        None => "No poll cycle finished yet.".to_string(),
    });
    lines.join("\n")
}

pub(crate) async fn status_html(state: &AppState) -> String {
    let status = state.scheduler.status().await;
    render_status(
        &status,
        state.poller.filter(),
        state.poller.last_result().as_ref(),
    )
}

pub(crate) async fn trigger_run(state: &AppState) -> &'static str {
    if state.scheduler.run_now().await {
        info!("poll cycle triggered by operator");
        "Polling Kwork now."
    } else {
        "Too many poll cycles are already running, try again later."
    }
}

pub(crate) fn set_paused(state: &AppState, paused: bool) -> &'static str {
    if paused {
        state.scheduler.pause();
        "Notifier paused."
    } else {
        state.scheduler.resume();
        "Notifier resumed."
    }
}

async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to reply");
    }
}

pub(crate) async fn send_menu(state: &AppState, chat_id: ChatId) {
    let html = status_html(state).await;
    let keyboard = menu_keyboard(state.scheduler.is_paused());
    if let Err(e) = state
        .messenger
        .send_inline_keyboard(chat_id, &html, keyboard)
        .await
    {
        warn!(chat_id = chat_id.0, error = %e, "failed to send menu");
    }
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, _args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" => send_menu(&state, chat_id).await,
        "help" => reply(&state, chat_id, HELP_HTML).await,
        "status" => {
            let html = status_html(&state).await;
            reply(&state, chat_id, &html).await;
        }
        "run" => reply(&state, chat_id, trigger_run(&state).await).await,
        "pause" => reply(&state, chat_id, set_paused(&state, true)).await,
        "resume" => reply(&state, chat_id, set_paused(&state, false)).await,
        _ => reply(&state, chat_id, "Unknown command. See /help").await,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kwn_core::{domain::CycleOutcome, messaging::types::ButtonAction};

    fn status(running: bool, paused: bool) -> SchedulerStatus {
        SchedulerStatus {
            running,
            paused,
            interval: Duration::from_secs(600),
            active_instances: 1,
            fired: 4,
            dropped: 1,
            last_fired_at: None,
        }
    }

    #[test]
    fn parse_command_strips_bot_suffix_and_args() {
        assert_eq!(parse_command("/Status@kwork_bot now"), ("status".to_string(), "now".to_string()));
        assert_eq!(parse_command("/run"), ("run".to_string(), String::new()));
    }

    #[test]
    fn menu_offers_the_opposite_toggle() {
        let data = |kb: InlineKeyboard| match &kb.rows[1][0].action {
            ButtonAction::Callback(d) => d.clone(),
            ButtonAction::Url(u) => u.clone(),
        };
        assert_eq!(data(menu_keyboard(false)), "menu:stop_notifier");
        assert_eq!(data(menu_keyboard(true)), "menu:start_notifier");
    }

    #[test]
    fn intervals_are_human_readable() {
        assert_eq!(format_interval(Duration::from_secs(600)), "10m");
        assert_eq!(format_interval(Duration::from_secs(7200)), "2h");
        assert_eq!(format_interval(Duration::from_secs(45)), "45s");
    }

    #[test]
    fn status_includes_state_filter_and_last_cycle() {
        let filter = Filter {
            categories: vec![41, 255],
            query: Some("<bot>".to_string()),
            ..Default::default()
        };
        let started = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let last = PollCycleResult {
            started_at: started,
            finished_at: started + chrono::Duration::seconds(12),
            fetched: 5,
            skipped: 2,
            sent: 3,
            failed: 0,
            outcome: CycleOutcome::Completed,
        };

        let html = render_status(&status(true, false), &filter, Some(&last));
        assert!(html.contains("<b>running</b>, every 10m"));
        assert!(html.contains("Categories: 41, 255"));
        assert!(html.contains("&lt;bot&gt;"));
        assert!(html.contains("fetched 5, sent 3, skipped 2, failed 0"));

        let html = render_status(&status(true, true), &filter, None);
        assert!(html.contains("<b>paused</b>"));
        assert!(html.contains("No poll cycle finished yet."));
        assert!(render_status(&status(false, false), &filter, None).contains("stopped"));
    }
}
