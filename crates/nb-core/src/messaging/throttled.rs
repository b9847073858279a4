use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    errors::{DispatchError, Error},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls to the same chat.
    pub per_chat_min_interval: Duration,
    /// Pause for every chat after Telegram reports a flood limit.
    pub rate_limit_cooldown: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
            rate_limit_cooldown: Duration::from_secs(3),
        }
    }
}

/// Next free send slots.
///
/// Only chats with a slot still in the future are tracked; a chat that has
/// been idle for one per-chat interval is indistinguishable from a new one.
#[derive(Debug)]
struct Slots {
    global: Instant,
    per_chat: HashMap<ChatId, Instant>,
}

impl Slots {
    fn reserve(&mut self, chat_id: Option<ChatId>, cfg: &ThrottleConfig) -> Duration {
        let now = Instant::now();
        self.per_chat.retain(|_, next| *next > now);

        let mut start = self.global.max(now);
        if let Some(chat_id) = chat_id {
            if let Some(next) = self.per_chat.get(&chat_id) {
                start = start.max(*next);
            }
            self.per_chat
                .insert(chat_id, start + cfg.per_chat_min_interval);
        }
        self.global = start + cfg.global_min_interval;
        start.saturating_duration_since(now)
    }

    fn cool_down(&mut self, pause: Duration) {
        self.global = self.global.max(Instant::now() + pause);
    }
}

/// MessagingPort decorator that spaces out outbound calls.
///
/// A poll tick fans new items out to every subscriber back to back; this keeps
/// the burst under Telegram's flood limits. When a send still comes back
/// rate limited, the rest of the fan-out waits `rate_limit_cooldown`.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots {
                global: Instant::now(),
                per_chat: HashMap::new(),
            }),
        }
    }

    async fn throttle(&self, chat_id: Option<ChatId>) {
        let wait = self.slots.lock().await.reserve(chat_id, &self.cfg);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::Dispatch(DispatchError::RateLimited)) = &result {
            tracing::warn!(
                cooldown_ms = self.cfg.rate_limit_cooldown.as_millis() as u64,
                "flood limit hit, pausing outbound messages"
            );
            self.slots
                .lock()
                .await
                .cool_down(self.cfg.rate_limit_cooldown);
        }
        result
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.slots.lock().await.per_chat.len()
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle(Some(chat_id)).await;
        let sent = self.inner.send_html(chat_id, html).await;
        self.observe(sent).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.throttle(Some(msg.chat_id)).await;
        let edited = self.inner.edit_html(msg, html).await;
        self.observe(edited).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle(Some(msg.chat_id)).await;
        self.inner.delete_message(msg).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.throttle(Some(chat_id)).await;
        let sent = self
            .inner
            .send_inline_keyboard(chat_id, html, keyboard)
            .await;
        self.observe(sent).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // Callback answers carry no chat; only the global spacing applies.
        self.throttle(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
