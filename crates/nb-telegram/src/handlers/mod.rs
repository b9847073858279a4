//! Telegram update handlers.
//!
//! Thin adapters: translate teloxide updates into `nb-core` commands and
//! callbacks and hand them to `CommandHandlers`. They always return `Ok` so a
//! single bad update never stops the dispatcher.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

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
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.trim_start().starts_with('/') {
        return commands::handle_command(msg.clone(), state).await;
    }

    if let Err(e) = bot
        .send_message(msg.chat.id, "Send /help to see what I can do.")
        .await
    {
        tracing::warn!(chat_id = msg.chat.id.0, error = %e, "failed to send help hint");
    }
    Ok(())
}
