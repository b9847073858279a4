/// Core error type.
///
/// Adapter crates map their specific errors into one of the three component
/// errors below so the poll loop and handlers can log and contain failures
/// consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Feed unreachable or malformed.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Network(String),

    #[error("feed request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("feed returned http status {0}")]
    HttpStatus(u16),

    #[error("feed body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Persistence read/write failure.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record for chat {chat_id}: {reason}")]
    Corrupt { chat_id: i64, reason: String },
}

/// Outbound message could not be delivered.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("chat {0} blocked the bot or no longer exists")]
    Blocked(i64),

    #[error("rate limited by chat platform")]
    RateLimited,

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("send failed: {0}")]
    Transport(String),
}
