//! Error types for feedwatch.

use thiserror::Error;

/// Common error type for feedwatch.
#[derive(Error, Debug)]
pub enum FeedwatchError {
    /// The persistent store could not be reached or rejected a query.
    ///
    /// Errors from sqlx are automatically converted to this variant.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record or payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Feed could not be fetched (transport failure or non-success status).
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        /// Feed URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// Feed entry carries neither an id nor a link.
    #[error("malformed entry in {source_name}: {reason}")]
    MalformedEntry {
        /// Owning source name.
        source_name: String,
        /// What is missing.
        reason: String,
    },

    /// Source could not be registered.
    #[error("failed to register source {name}: {reason}")]
    Registration {
        /// Source name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// Notification transport failure.
    #[error("delivery error: {0}")]
    Delivery(String),
}

impl FeedwatchError {
    /// Whether this error must abort the whole poll cycle.
    ///
    /// Only store failures escape per-source isolation; everything else is
    /// scoped to one source or one notification batch.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, FeedwatchError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for FeedwatchError {
    fn from(e: sqlx::Error) -> Self {
        FeedwatchError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for feedwatch operations.
pub type Result<T> = std::result::Result<T, FeedwatchError>;
