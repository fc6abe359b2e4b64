#![forbid(unsafe_code)]

//! Query keys: ordered, JSON-shaped identity for cache entries.
//!
//! A key is a non-empty list of JSON-like parts — `["todos"]`,
//! `["todos", {"page": 2}]`. Two keys identify the same cache entry iff
//! their canonical serializations match: object members serialize with
//! sorted member names (serde_json's default map is ordered), so
//! `{"a":1,"b":2}` and `{"b":2,"a":1}` hash identically while part order
//! stays significant.

use serde_json::Value;

use crate::error::{QueryError, Result};

/// Canonical serialization of a [`QueryKey`]; the cache map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKeyHash(String);

impl QueryKeyHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryKeyHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered list of JSON-like parts identifying one logical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
    parts: Vec<Value>,
    hash: QueryKeyHash,
}

impl QueryKey {
    /// Build a key from its parts. Empty keys are a configuration error.
    pub fn new(parts: Vec<Value>) -> Result<Self> {
        if parts.is_empty() {
            return Err(QueryError::EmptyKey);
        }
        let hash = serde_json::to_string(&parts).map_err(|err| QueryError::KeySerialization {
            message: err.to_string(),
        })?;
        Ok(Self {
            parts,
            hash: QueryKeyHash(hash),
        })
    }

    /// Single-part convenience constructor.
    pub fn of(part: impl Into<Value>) -> Result<Self> {
        Self::new(vec![part.into()])
    }

    #[must_use]
    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    #[must_use]
    pub fn hash(&self) -> &QueryKeyHash {
        &self.hash
    }
}

/// `Display` is the canonical serialization; used in error messages and
/// logs.
impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hash.as_str())
    }
}
