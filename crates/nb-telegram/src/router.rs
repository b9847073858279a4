use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tokio_util::sync::CancellationToken;

use nb_core::{
    cache::CachedFeed,
    commands::CommandHandlers,
    config::Config,
    dispatch::Dispatcher as ItemDispatcher,
    locks::ChatLocks,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    poller::Poller,
    ports::{FeedSource, SubscriberStore},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandHandlers>,
}

/// Run the bot until Ctrl-C: the poll loop in the background, Telegram long
/// polling in the foreground.
pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn SubscriberStore>,
    feed: Arc<dyn FeedSource>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    tracing::info!(feed = %cfg.feed_url, "watching feed");

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        tracing::warn!(error = %e, "failed to register command menu");
    }

    // Fan-out after a busy tick would otherwise trip Telegram's flood control.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let locks = Arc::new(ChatLocks::default());
    let dispatcher = ItemDispatcher::from_config(&cfg, messenger.clone());

    let poller = Poller::new(
        cfg.feed_url.clone(),
        cfg.poll_interval,
        feed.clone(),
        store.clone(),
        dispatcher.clone(),
        locks.clone(),
    );
    let cancel = CancellationToken::new();
    let poll_task = poller.spawn(cancel.clone());

    let latest: Arc<dyn FeedSource> = Arc::new(CachedFeed::new(feed, cfg.latest_cache_ttl));
    let commands = Arc::new(CommandHandlers::new(
        cfg.feed_url.clone(),
        latest,
        store,
        messenger,
        dispatcher,
        locks,
    ));

    let state = Arc::new(AppState { commands });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("shutting down");
    cancel.cancel();
    if let Err(e) = poll_task.await {
        tracing::error!(error = %e, "poll loop task failed");
    }

    Ok(())
}

fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Set up news notifications"),
        BotCommand::new("settings", "Show or change your subscription"),
        BotCommand::new("latest", "Get the newest article now"),
        BotCommand::new("help", "List commands"),
    ]
}
