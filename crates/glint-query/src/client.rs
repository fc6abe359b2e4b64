#![forbid(unsafe_code)]

//! The query client: cache ownership plus client-level defaults.

use std::rc::Rc;

use web_time::Duration;

use crate::cache::QueryCache;
use crate::options::{DefaultedQueryOptions, QueryOptions};

/// Client-level defaults applied to every option set that leaves a field
/// unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultOptions {
    pub enabled: bool,
    pub stale_time: Duration,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::ZERO,
        }
    }
}

struct ClientInner {
    defaults: DefaultOptions,
    cache: QueryCache,
}

/// Handle to one query client. Cheap to clone; all clones share the same
/// cache and defaults.
#[derive(Clone)]
pub struct QueryClient {
    inner: Rc<ClientInner>,
}

impl QueryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_defaults(DefaultOptions::default())
    }

    #[must_use]
    pub fn with_defaults(defaults: DefaultOptions) -> Self {
        Self {
            inner: Rc::new(ClientInner {
                defaults,
                cache: QueryCache::new(),
            }),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn defaults(&self) -> &DefaultOptions {
        &self.inner.defaults
    }

    /// Fill unset fields from the client defaults, producing an
    /// engine-ready configuration. The optimistic-results marker starts
    /// off; the bridge's resolver switches it on.
    #[must_use]
    pub fn defaulted_options<T: Clone>(&self, options: QueryOptions<T>) -> DefaultedQueryOptions<T> {
        let defaults = &self.inner.defaults;
        DefaultedQueryOptions {
            key: options.key,
            fetcher: options.fetcher,
            enabled: options.enabled.unwrap_or(defaults.enabled),
            stale_time: options.stale_time.unwrap_or(defaults.stale_time),
            initial_data: options.initial_data,
            optimistic_results: false,
        }
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("defaults", &self.inner.defaults)
            .field("cache", &self.inner.cache)
            .finish()
    }
}
