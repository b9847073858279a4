use std::sync::Arc;

use teloxide::prelude::*;

use nb_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::CallbackQuery as CoreCallback,
};

use crate::router::AppState;

/// Translate a button press; presses without a message or data are answered
/// and dropped.
pub(crate) fn to_core(
    callback_id: String,
    data: Option<String>,
    message: Option<(i64, i32)>,
) -> Option<CoreCallback> {
    let (chat, message_id) = message?;
    let data = data.filter(|d| !d.is_empty())?;
    let chat_id = ChatId(chat);
    Some(CoreCallback {
        chat_id,
        callback_id,
        data,
        message: Some(MessageRef {
            chat_id,
            message_id: MessageId(message_id),
        }),
    })
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let message = q.message.as_ref().map(|m| (m.chat.id.0, m.id.0));

    match to_core(q.id.clone(), q.data.clone(), message) {
        Some(cb) => state.commands.handle_callback(&cb).await,
        None => {
            if let Err(e) = bot.answer_callback_query(q.id).await {
                tracing::warn!(error = %e, "failed to answer callback query");
            }
        }
    }
    Ok(())
}
