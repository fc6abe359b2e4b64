#![forbid(unsafe_code)]

//! Query client, cache, observer, and the reactive bridge.
//!
//! The centerpiece is [`create_base_query`]: it keeps a read-only,
//! field-reactive [`QueryResultView`] synchronized with a query observer,
//! re-resolving configuration whenever the caller's reactive inputs
//! change, while guaranteeing a single observer per bridge and
//! deterministic teardown with the owning [`Scope`](glint_reactive::Scope).
//!
//! Fetch scheduling (retry, dedup, transport) is not this crate's job: the
//! cache exposes a synchronous dispatch seam
//! ([`QueryCache::dispatch`](cache::QueryCache::dispatch)) through which an
//! executor delivers completions on the reactive thread.

pub mod bridge;
pub mod cache;
pub mod client;
pub mod error;
pub mod key;
pub mod observer;
pub mod options;
pub mod result;
pub mod view;

pub use bridge::{create_base_query, create_query};
pub use cache::{QueryCache, QueryEntry, QueryState};
pub use client::{DefaultOptions, QueryClient};
pub use error::{FetchError, QueryError};
pub use key::{QueryKey, QueryKeyHash};
pub use observer::{QueryObserve, QueryObserver};
pub use options::{DefaultedQueryOptions, Fetcher, NotifyListeners, QueryOptions};
pub use result::{FetchStatus, QueryResult, QueryStatus};
pub use view::QueryResultView;
