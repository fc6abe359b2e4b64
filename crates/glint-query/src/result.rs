#![forbid(unsafe_code)]

//! Result snapshots: the value the bridge keeps synchronized with the
//! observer.
//!
//! A [`QueryResult`] is always replaced whole — the propagator never
//! patches individual fields — so any reader sees a consistent
//! data/error/status combination.

use web_time::{Duration, Instant};

use crate::error::FetchError;

/// Lifecycle of the query's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No data yet (and no error).
    Pending,
    /// The last fetch failed; `error` is populated.
    Error,
    /// Data is available.
    Success,
}

/// Whether a fetch is in flight right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Fetching,
}

/// One atomic snapshot of a query's externally visible state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    /// When `data` was last written, if ever.
    pub updated_at: Option<Instant>,
}

impl<T> QueryResult<T> {
    /// The snapshot before anything happened: no data, no error, idle.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            fetch_status: FetchStatus::Idle,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.fetch_status == FetchStatus::Fetching
    }

    /// Whether the data is older than `stale_time` (data that was never
    /// written is always stale).
    #[must_use]
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        match self.updated_at {
            Some(at) => at.elapsed() >= stale_time,
            None => true,
        }
    }
}

impl<T> Default for QueryResult<T> {
    fn default() -> Self {
        Self::pending()
    }
}
