use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    domain::{ChatId, FeedItem},
    errors::{DispatchError, Error},
    formatting::format_item_html,
    messaging::port::MessagingPort,
};

/// Formats feed items and sends them through the chat transport.
///
/// One call is one outbound message. Failures are reported to the caller and
/// never retried here.
#[derive(Clone)]
pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    send_timeout: Duration,
    summary_max_chars: usize,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        send_timeout: Duration,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            messenger,
            send_timeout,
            summary_max_chars,
        }
    }

    pub fn from_config(cfg: &Config, messenger: Arc<dyn MessagingPort>) -> Self {
        Self::new(messenger, cfg.send_timeout, cfg.summary_max_chars)
    }

    pub fn render(&self, item: &FeedItem) -> String {
        format_item_html(item, self.summary_max_chars)
    }

    pub async fn deliver(&self, chat_id: ChatId, item: &FeedItem) -> Result<(), DispatchError> {
        let html = self.render(item);
        let sent = tokio::time::timeout(self.send_timeout, self.messenger.send_html(chat_id, &html))
            .await
            .map_err(|_| DispatchError::Timeout(self.send_timeout))?;

        match sent {
            Ok(_) => Ok(()),
            Err(Error::Dispatch(e)) => Err(e),
            Err(other) => Err(DispatchError::Transport(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, FakeMessenger};

    #[tokio::test]
    async fn delivers_one_formatted_message() {
        let fake = Arc::new(FakeMessenger::default());
        let d = Dispatcher::new(fake.clone(), Duration::from_secs(1), 500);

        d.deliver(ChatId(9), &item("a", 3)).await.unwrap();

        let sent = fake.sent_to(ChatId(9));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("<b>Title a</b>"));
        assert!(sent[0].contains("https://example.com/a"));
    }

    #[tokio::test]
    async fn reports_blocked_chat() {
        let fake = Arc::new(FakeMessenger::default());
        fake.block(ChatId(9));
        let d = Dispatcher::new(fake.clone(), Duration::from_secs(1), 500);

        let err = d.deliver(ChatId(9), &item("a", 3)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Blocked(9)));
        assert_eq!(fake.total_sends(), 0);
    }
}
