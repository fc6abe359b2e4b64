#![forbid(unsafe_code)]

//! Query configuration: caller-supplied options and their client-defaulted
//! form.
//!
//! [`QueryOptions`] is what an options producer returns; unset fields fall
//! back to the client's defaults. [`DefaultedQueryOptions`] is the
//! engine-ready snapshot the resolver writes into its transitional slot —
//! every field concrete, plus the optimistic-results marker. Defaulted
//! options are replaced, never mutated, on each resolution.

use std::rc::Rc;

use web_time::Duration;

use crate::error::FetchError;
use crate::key::QueryKey;

/// Synchronous stand-in for the engine's fetch function. The engine (or a
/// test) invokes it via the cache's dispatch path; the bridge never calls
/// it directly.
pub type Fetcher<T> = Rc<dyn Fn() -> std::result::Result<T, FetchError>>;

/// Whether a `set_options` call fans out to the observer's subscribers.
///
/// The bridge always applies configuration with [`Silent`]: configuration
/// changes reach the result slot through the optimistic read, and letting
/// them also flow through the subscription stream would double-notify.
///
/// [`Silent`]: NotifyListeners::Silent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyListeners {
    Yes,
    Silent,
}

/// Caller-supplied query configuration.
pub struct QueryOptions<T> {
    pub key: QueryKey,
    pub fetcher: Option<Fetcher<T>>,
    pub enabled: Option<bool>,
    pub stale_time: Option<Duration>,
    /// Served as synchronous success data while the cache entry is empty.
    pub initial_data: Option<T>,
}

impl<T> QueryOptions<T> {
    #[must_use]
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            fetcher: None,
            enabled: None,
            stale_time: None,
            initial_data: None,
        }
    }

    #[must_use]
    pub fn fetcher(
        mut self,
        fetcher: impl Fn() -> std::result::Result<T, FetchError> + 'static,
    ) -> Self {
        self.fetcher = Some(Rc::new(fetcher));
        self
    }

    /// Reuse an already-built fetcher handle. Producers that re-run on
    /// reactive input changes should prefer this over [`fetcher`]: options
    /// built around the same handle compare equal, so an unchanged
    /// resolution stays a no-op.
    ///
    /// [`fetcher`]: Self::fetcher
    #[must_use]
    pub fn fetcher_rc(mut self, fetcher: Fetcher<T>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    #[must_use]
    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }
}

impl<T: Clone> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: self.fetcher.clone(),
            enabled: self.enabled,
            stale_time: self.stale_time,
            initial_data: self.initial_data.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .field("has_fetcher", &self.fetcher.is_some())
            .field("enabled", &self.enabled)
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

/// Engine-ready configuration: client defaults applied, optimistic first
/// read requested.
pub struct DefaultedQueryOptions<T> {
    pub key: QueryKey,
    pub fetcher: Option<Fetcher<T>>,
    pub enabled: bool,
    pub stale_time: Duration,
    pub initial_data: Option<T>,
    /// Marks that the observer should compute a synchronous optimistic
    /// result for this configuration instead of waiting for an async
    /// round trip.
    pub optimistic_results: bool,
}

impl<T: Clone> Clone for DefaultedQueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: self.fetcher.clone(),
            enabled: self.enabled,
            stale_time: self.stale_time,
            initial_data: self.initial_data.clone(),
            optimistic_results: self.optimistic_results,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DefaultedQueryOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultedQueryOptions")
            .field("key", &self.key)
            .field("has_fetcher", &self.fetcher.is_some())
            .field("enabled", &self.enabled)
            .field("stale_time", &self.stale_time)
            .field("optimistic_results", &self.optimistic_results)
            .finish()
    }
}

/// Fetchers compare by handle identity: equality means "same `Rc`".
/// Producers that rebuild a closure every run therefore always compare
/// unequal, which matches the engine's referential treatment of options
/// objects; producers that reuse a handle get no-op resolutions for free.
impl<T: PartialEq> PartialEq for DefaultedQueryOptions<T> {
    fn eq(&self, other: &Self) -> bool {
        let fetcher_eq = match (&self.fetcher, &other.fetcher) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        fetcher_eq
            && self.key == other.key
            && self.enabled == other.enabled
            && self.stale_time == other.stale_time
            && self.initial_data == other.initial_data
            && self.optimistic_results == other.optimistic_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKey;

    fn key() -> QueryKey {
        QueryKey::of("todos").unwrap()
    }

    #[test]
    fn builder_fills_fields() {
        let options: QueryOptions<u32> = QueryOptions::new(key())
            .enabled(false)
            .stale_time(Duration::from_secs(30))
            .initial_data(7);
        assert_eq!(options.enabled, Some(false));
        assert_eq!(options.stale_time, Some(Duration::from_secs(30)));
        assert_eq!(options.initial_data, Some(7));
        assert!(options.fetcher.is_none());
    }

    #[test]
    fn defaulted_equality_by_fetcher_handle() {
        let fetcher: Fetcher<u32> = Rc::new(|| Ok(1));
        let build = |f: Fetcher<u32>| DefaultedQueryOptions {
            key: key(),
            fetcher: Some(f),
            enabled: true,
            stale_time: Duration::ZERO,
            initial_data: None,
            optimistic_results: true,
        };
        let a = build(Rc::clone(&fetcher));
        let b = build(Rc::clone(&fetcher));
        assert_eq!(a, b);

        let c = build(Rc::new(|| Ok(1)));
        assert_ne!(a, c);
    }

    #[test]
    fn defaulted_equality_sees_key_change() {
        let a: DefaultedQueryOptions<u32> = DefaultedQueryOptions {
            key: key(),
            fetcher: None,
            enabled: true,
            stale_time: Duration::ZERO,
            initial_data: None,
            optimistic_results: true,
        };
        let mut b = a.clone();
        b.key = QueryKey::of("users").unwrap();
        assert_ne!(a, b);
    }
}
