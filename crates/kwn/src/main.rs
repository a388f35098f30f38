use std::sync::Arc;

use clap::{Parser, Subcommand};
use teloxide::Bot;
use tracing::{info, warn};

use kwn_core::{
    config::Config,
    dedup::Deduplicator,
    formatting::format_cycle_summary,
    messaging::port::MessagingPort,
    notifier::ChatNotifier,
    pacing::RandomPacer,
    poller::PollCycle,
    ports::{KeyValueStore, ListingSource},
    scheduler::IntervalScheduler,
};
use kwn_kwork::{KworkClient, KworkConfig};
use kwn_redis::RedisStore;
use kwn_telegram::{
    router::{run_polling, AppState},
    TelegramMessenger,
};

/// Watch Kwork for new projects and post them to Telegram.
#[derive(Parser, Debug)]
#[command(name = "kwn", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Poll on the configured interval and serve the operator menu (default).
    Run,
    /// Run a single poll cycle and exit.
    Once {
        /// Notify every fetched project, even ones already delivered.
        #[arg(long)]
        ignore_seen: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), kwn_core::Error> {
    let cli = Cli::parse();

    let cfg = Arc::new(Config::load()?);
    kwn_core::logging::init("kwn", &cfg.log_level)?;

    let source = Arc::new(KworkClient::new(KworkConfig::from(cfg.as_ref()))?);
    let store = Arc::new(RedisStore::open(&cfg.redis_url)?);
    store.connect().await?;

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let ignore_seen = matches!(cli.command, Some(Commands::Once { ignore_seen: true }));
    let poller = Arc::new(
        PollCycle::new(
            cfg.filter(),
            source.clone(),
            Deduplicator::new(store.clone(), cfg.dedup_ttl, cfg.dedup_key_prefix.clone()),
            Arc::new(ChatNotifier::new(messenger.clone(), cfg.notify_chat_id)),
            Arc::new(RandomPacer::new(cfg.pacing_delays.clone())),
        )
        .with_seen_check(!ignore_seen),
    );

    let outcome = match cli.command.unwrap_or(Commands::Run) {
        Commands::Once { .. } => {
            let result = poller.run().await;
            info!("{}", format_cycle_summary(&result));
            Ok(())
        }
        Commands::Run => {
            let scheduler = IntervalScheduler::new(poller.clone(), cfg.schedule());
            scheduler.start().await;

            let state = Arc::new(AppState {
                cfg: cfg.clone(),
                messenger,
                scheduler: scheduler.clone(),
                poller,
            });
            let served = run_polling(bot, state)
                .await
                .map_err(|e| kwn_core::Error::External(format!("telegram bot failed: {e}")));

            scheduler.stop().await;
            served
        }
    };

    if let Err(e) = source.close().await {
        warn!(error = %e, "failed to close kwork client");
    }
    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close redis store");
    }

    outcome
}
