//! User-facing command handlers: `/start`, `/settings`, `/latest`, `/help`
//! and the subscription toggle buttons.
//!
//! Handlers never propagate errors to the transport: every failure is logged
//! and answered with a short apology to the user.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    dispatch::Dispatcher,
    domain::{ChatId, MessageRef},
    locks::ChatLocks,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, InlineKeyboard},
    },
    ports::{FeedSource, SubscriberStore},
    Result,
};

pub const CB_SUBSCRIBE: &str = "sub:on";
pub const CB_UNSUBSCRIBE: &str = "sub:off";

const START_TEXT: &str = "Do you want to receive the latest news? Change your preference below. \
You can always use /settings later.";

const HELP_TEXT: &str = "<b>News bot</b>\n\n\
/start - set up notifications\n\
/settings - show or change your subscription\n\
/settings toggle - flip your subscription\n\
/latest - get the newest article now\n\
/help - this message";

/// Enable/Disable button reflecting the current state.
pub fn settings_keyboard(subscribed: bool) -> InlineKeyboard {
    if subscribed {
        InlineKeyboard::single("Disable", CB_UNSUBSCRIBE)
    } else {
        InlineKeyboard::single("Enable", CB_SUBSCRIBE)
    }
}

fn status_text(subscribed: bool) -> String {
    let status = if subscribed { "enabled" } else { "disabled" };
    format!(
        "News subscription is currently <b>{status}</b>. \
You can change it below or use this command again later."
    )
}

fn confirmation_text(subscribed: bool) -> &'static str {
    if subscribed {
        "Subscription enabled. To change your preferences, use /settings."
    } else {
        "Subscription disabled. To change your preferences, use /settings."
    }
}

pub struct CommandHandlers {
    feed_url: String,
    latest: Arc<dyn FeedSource>,
    store: Arc<dyn SubscriberStore>,
    messenger: Arc<dyn MessagingPort>,
    dispatcher: Dispatcher,
    locks: Arc<ChatLocks>,
    // Last `/start` prompt per chat, removed again by `/settings`.
    intro: Mutex<HashMap<ChatId, MessageRef>>,
}

impl CommandHandlers {
    pub fn new(
        feed_url: impl Into<String>,
        latest: Arc<dyn FeedSource>,
        store: Arc<dyn SubscriberStore>,
        messenger: Arc<dyn MessagingPort>,
        dispatcher: Dispatcher,
        locks: Arc<ChatLocks>,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            latest,
            store,
            messenger,
            dispatcher,
            locks,
            intro: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_command(&self, cmd: &Command) {
        let chat_id = cmd.chat_id;
        let (result, apology) = match cmd.name.as_str() {
            "start" => (
                self.start(chat_id).await,
                "An error occurred during setup. Please try again later.",
            ),
            "settings" if cmd.args.eq_ignore_ascii_case("toggle") => (
                self.toggle(chat_id).await,
                "Something went wrong while updating your subscription.",
            ),
            "settings" => (
                self.settings(chat_id).await,
                "Failed to retrieve settings. Please try again later.",
            ),
            "latest" => (
                self.latest(chat_id).await,
                "Error while fetching the latest news.",
            ),
            "help" => (
                self.reply(chat_id, HELP_TEXT).await,
                "Failed to show help.",
            ),
            _ => (
                self.reply(chat_id, "Unknown command. Try /help.").await,
                "Unknown command.",
            ),
        };

        if let Err(e) = result {
            tracing::error!(chat_id = chat_id.0, command = %cmd.name, error = %e, "command failed");
            self.apologize(chat_id, apology).await;
        }
    }

    pub async fn handle_callback(&self, q: &CallbackQuery) {
        let target = match q.data.as_str() {
            CB_SUBSCRIBE => true,
            CB_UNSUBSCRIBE => false,
            other => {
                tracing::debug!(chat_id = q.chat_id.0, data = %other, "ignoring unknown callback");
                if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
                    tracing::warn!(error = %e, "failed to answer callback query");
                }
                return;
            }
        };

        if let Err(e) = self.apply_toggle(q, target).await {
            tracing::error!(chat_id = q.chat_id.0, data = %q.data, error = %e, "subscription toggle failed");
            if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
                tracing::warn!(chat_id = q.chat_id.0, error = %e, "failed to answer callback query");
            }
            self.apologize(
                q.chat_id,
                "Something went wrong while updating your subscription.",
            )
            .await;
        }
    }

    async fn start(&self, chat_id: ChatId) -> Result<()> {
        let sub = match self.store.get(chat_id).await? {
            Some(existing) => existing,
            None => {
                tracing::info!(chat_id = chat_id.0, "new chat");
                self.store.get_or_create(chat_id).await?
            }
        };

        let prompt = self
            .messenger
            .send_inline_keyboard(chat_id, START_TEXT, settings_keyboard(sub.subscribed))
            .await?;
        self.intro.lock().await.insert(chat_id, prompt);
        Ok(())
    }

    async fn settings(&self, chat_id: ChatId) -> Result<()> {
        let prev = self.intro.lock().await.remove(&chat_id);
        if let Some(msg) = prev {
            if let Err(e) = self.messenger.delete_message(msg).await {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not delete /start prompt");
            }
        }

        let sub = self.store.get_or_create(chat_id).await?;
        self.messenger
            .send_inline_keyboard(
                chat_id,
                &status_text(sub.subscribed),
                settings_keyboard(sub.subscribed),
            )
            .await?;
        Ok(())
    }

    /// Read, flip and persist under the chat lock.
    async fn toggle(&self, chat_id: ChatId) -> Result<()> {
        let now = {
            let _guard = self.locks.lock_chat(chat_id).await;
            let sub = self.store.get_or_create(chat_id).await?;
            let now = !sub.subscribed;
            self.store.set_subscribed(chat_id, now).await?;
            now
        };

        tracing::info!(chat_id = chat_id.0, subscribed = now, "subscription toggled");
        self.messenger
            .send_inline_keyboard(chat_id, confirmation_text(now), settings_keyboard(now))
            .await?;
        Ok(())
    }

    async fn apply_toggle(&self, q: &CallbackQuery, target: bool) -> Result<()> {
        let changed = {
            let _guard = self.locks.lock_chat(q.chat_id).await;
            let sub = self.store.get_or_create(q.chat_id).await?;
            if sub.subscribed != target {
                self.store.set_subscribed(q.chat_id, target).await?;
            }
            sub.subscribed != target
        };

        if changed {
            tracing::info!(chat_id = q.chat_id.0, subscribed = target, "subscription toggled");
        }

        let answer = if target {
            "Subscription started."
        } else {
            "Subscription stopped."
        };
        self.messenger
            .answer_callback_query(&q.callback_id, Some(answer))
            .await?;

        let text = confirmation_text(target);
        let edited = match q.message {
            Some(msg) => self.messenger.edit_html(msg, text).await,
            None => Err(crate::Error::External("callback without message".to_string())),
        };
        if let Err(e) = edited {
            // Old or already-edited messages cannot be changed; confirm separately.
            tracing::debug!(chat_id = q.chat_id.0, error = %e, "could not edit toggle message");
            self.messenger.send_html(q.chat_id, text).await?;
        }
        Ok(())
    }

    /// Newest item straight from the feed. Leaves the watermark alone.
    async fn latest(&self, chat_id: ChatId) -> Result<()> {
        let items = self.latest.fetch(&self.feed_url).await?;
        let Some(newest) = items.first() else {
            return self
                .reply(chat_id, "Could not find any articles in this feed.")
                .await;
        };
        self.dispatcher.deliver(chat_id, newest).await?;
        Ok(())
    }

    async fn reply(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.messenger.send_html(chat_id, html).await?;
        Ok(())
    }

    async fn apologize(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_html(chat_id, text).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to report error to user");
        }
    }
}
