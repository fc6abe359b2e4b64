#![forbid(unsafe_code)]

//! Error taxonomy for the query layer.
//!
//! Two channels, deliberately kept apart:
//!
//! - [`QueryError`]: configuration errors (malformed key, missing fetcher,
//!   cache type conflicts). These surface synchronously — as `Err` from
//!   construction paths, or as a panic when a later reactive re-resolution
//!   produces a rejected configuration.
//! - [`FetchError`]: query *execution* failures (network, validation).
//!   These never throw; they ride inside the result snapshot's `error`
//!   field and are observed reactively through `status`.

use thiserror::Error;

/// Alias used throughout the query layer.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Configuration and usage errors. Not the channel for fetch failures —
/// those are [`FetchError`]s inside the result snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query key must contain at least one part")]
    EmptyKey,

    #[error("query key is not serializable: {message}")]
    KeySerialization { message: String },

    #[error("no fetcher configured for query {key} and no cached data to serve")]
    MissingFetcher { key: String },

    #[error("cache entry for {key} already holds a different data type")]
    EntryTypeMismatch { key: String },
}

/// A failed query execution, delivered as data through the result
/// snapshot. Cloneable so snapshots can be replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = QueryError::MissingFetcher {
            key: "[\"todos\"]".into(),
        };
        let text = err.to_string();
        assert!(text.contains("no fetcher"));
        assert!(text.contains("todos"));

        let fetch = FetchError::new("connection refused");
        assert_eq!(fetch.to_string(), "connection refused");
    }
}
