use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use kwn_core::{
    config::Config, messaging::port::MessagingPort, poller::PollCycle,
    scheduler::IntervalScheduler,
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub scheduler: IntervalScheduler,
    pub poller: Arc<PollCycle>,
}

/// Serve the operator menu until Ctrl-C.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "operator bot started"),
        Err(e) => warn!(error = %e, "could not fetch bot identity"),
    }
    info!(allowed_users = state.cfg.acl_user_ids.len(), "operator ACL loaded");

    let commands = vec![
        BotCommand::new("start", "show the menu"),
        BotCommand::new("status", "notifier status"),
        BotCommand::new("run", "poll kwork now"),
        BotCommand::new("pause", "pause notifications"),
        BotCommand::new("resume", "resume notifications"),
        BotCommand::new("help", "get help"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!(error = %e, "could not register bot commands");
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("operator bot stopped");
    Ok(())
}
