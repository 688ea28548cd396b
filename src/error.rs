#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid exclude pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Watcher is already running")]
    WatcherAlreadyStarted,

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Converts a poisoned-lock failure into an internal error.
pub fn lock_poisoned_error(what: &str) -> IndexError {
    IndexError::Internal(format!("{what} lock poisoned"))
}
