#![forbid(unsafe_code)]

//! Read-only, field-reactive view over the result cell.
//!
//! # Design
//!
//! [`QueryResultView`] exposes the bridge's result cell without a write
//! path. Instead of one projection hand-authored per result shape, the
//! view materializes a memoized [`Computed`] projection per field *on
//! first access* and caches it by field name — the per-field lazy-cache
//! rendering of a dynamic proxy. [`field`](QueryResultView::field) accepts
//! any projection of the snapshot, so arbitrary result shapes work without
//! enumerating fields up front; the named accessors below are built on it.
//!
//! Each projection's version moves only when *that field's value* changes,
//! so two fields of the same view react independently: a snapshot write
//! that leaves `data` untouched leaves the `data` projection untouched.
//!
//! A projection read is never stale: staleness is checked against the
//! result cell's version at read time, batched writes included.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use web_time::Instant;

use glint_reactive::{Computed, Observable};

use crate::error::FetchError;
use crate::result::{FetchStatus, QueryResult, QueryStatus};

/// Read-only reactive projection of a [`QueryResult`] cell, one memoized
/// projection per accessed field.
pub struct QueryResultView<T> {
    source: Observable<QueryResult<T>>,
    fields: Rc<RefCell<AHashMap<&'static str, Box<dyn Any>>>>,
}

impl<T: Clone + PartialEq + 'static> QueryResultView<T> {
    pub(crate) fn new(source: Observable<QueryResult<T>>) -> Self {
        Self {
            source,
            fields: Rc::new(RefCell::new(AHashMap::new())),
        }
    }

    /// The memoized projection for `name`, created from `project` on first
    /// access and cached thereafter. Later calls with the same name return
    /// the cached projection (and ignore the new closure), so a field name
    /// must always be paired with the same projection type.
    pub fn field<U: Clone + PartialEq + 'static>(
        &self,
        name: &'static str,
        project: impl Fn(&QueryResult<T>) -> U + 'static,
    ) -> Computed<U> {
        let mut fields = self.fields.borrow_mut();
        if let Some(cached) = fields.get(name) {
            if let Some(projection) = cached.downcast_ref::<Computed<U>>() {
                return projection.clone();
            }
        }
        let projection = Computed::from_observable(&self.source, project);
        fields.insert(name, Box::new(projection.clone()));
        projection
    }

    /// A clone of the whole current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> QueryResult<T> {
        self.source.get()
    }

    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.field("data", |r| r.data.clone()).get()
    }

    #[must_use]
    pub fn error(&self) -> Option<FetchError> {
        self.field("error", |r| r.error.clone()).get()
    }

    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.field("status", |r| r.status).get()
    }

    #[must_use]
    pub fn fetch_status(&self) -> FetchStatus {
        self.field("fetch_status", |r| r.fetch_status).get()
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<Instant> {
        self.field("updated_at", |r| r.updated_at).get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.field("is_pending", QueryResult::is_pending).get()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.field("is_success", QueryResult::is_success).get()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.field("is_error", QueryResult::is_error).get()
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.field("is_fetching", QueryResult::is_fetching).get()
    }
}

/// Clones share the same snapshot cell and projection cache.
impl<T> Clone for QueryResultView<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            fields: Rc::clone(&self.fields),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for QueryResultView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResultView")
            .field("snapshot", &self.source)
            .field("materialized_fields", &self.fields.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
