//! Telegram adapter (teloxide).
//!
//! Implements the `nb-core` MessagingPort over the Telegram Bot API and routes
//! incoming updates to the core command handlers.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use nb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::{DispatchError, Error},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    async fn with_retry<T, Fut>(
        &self,
        chat_id: Option<ChatId>,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(e) => return Err(map_err(chat_id, e)),
            }
        }
    }
}

/// Classify a Telegram failure so the poll loop can tell a dead chat from a
/// transient problem.
pub(crate) fn map_err(chat_id: Option<ChatId>, e: RequestError) -> Error {
    let dispatch = match (&e, chat_id) {
        (
            RequestError::Api(
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::ChatNotFound
                | ApiError::UserDeactivated,
            ),
            Some(chat),
        ) => DispatchError::Blocked(chat.0),
        (RequestError::RetryAfter(_), _) => DispatchError::RateLimited,
        _ => DispatchError::Transport(format!("telegram error: {e}")),
    };
    Error::Dispatch(dispatch)
}

pub(crate) fn keyboard_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .buttons
        .into_iter()
        .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(Some(chat_id), || {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(Some(msg.chat_id), || {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(Some(msg.chat_id), || {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = keyboard_markup(keyboard);

        let msg = self
            .with_retry(Some(chat_id), || {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(None, || {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use nb_core::commands::settings_keyboard;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn blocked_chat_is_classified() {
        let err = map_err(Some(ChatId(5)), RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, Error::Dispatch(DispatchError::Blocked(5))));
    }

    #[test]
    fn retry_after_is_rate_limit() {
        let err = map_err(
            Some(ChatId(5)),
            RequestError::RetryAfter(Duration::from_secs(3)),
        );
        assert!(matches!(err, Error::Dispatch(DispatchError::RateLimited)));
    }

    #[test]
    fn other_api_errors_are_transport_failures() {
        let err = map_err(None, RequestError::Api(ApiError::MessageNotModified));
        assert!(matches!(err, Error::Dispatch(DispatchError::Transport(_))));
    }

    #[test]
    fn keyboard_is_one_button_per_row() {
        let markup = keyboard_markup(settings_keyboard(false));
        assert_eq!(markup.inline_keyboard.len(), 1);
        let button = &markup.inline_keyboard[0][0];
        assert_eq!(button.text, "Enable");
        assert!(matches!(
            &button.kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "sub:on"
        ));
    }
}
