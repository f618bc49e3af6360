//! One-shot values produced by a resource after it is realized.
//!
//! A `DeferredValue` is bound to a `(producer, attribute)` pair. Every clone
//! shares the same cell, so all consumers observe the same resolution.
//! The transition `Pending -> Resolved` happens at most once.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::resource::ResourceId;

/// Resolution state of a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredState {
    Pending,
    Resolved,
}

struct Inner {
    producer: ResourceId,
    attribute: String,
    cell: OnceLock<String>,
}

/// Read-many handle on a producer attribute known only after creation.
#[derive(Clone)]
pub struct DeferredValue {
    inner: Arc<Inner>,
}

impl DeferredValue {
    /// Create a pending value for `producer.attribute`.
    pub fn new(producer: ResourceId, attribute: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                producer,
                attribute: attribute.into(),
                cell: OnceLock::new(),
            }),
        }
    }

    pub fn producer(&self) -> &ResourceId {
        &self.inner.producer
    }

    pub fn attribute(&self) -> &str {
        &self.inner.attribute
    }

    /// `producer.attribute`, used in logs and plan output.
    pub fn reference(&self) -> String {
        format!("{}.{}", self.inner.producer, self.inner.attribute)
    }

    pub fn state(&self) -> DeferredState {
        if self.inner.cell.get().is_some() {
            DeferredState::Resolved
        } else {
            DeferredState::Pending
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == DeferredState::Resolved
    }

    /// The resolved value, if any.
    pub fn get(&self) -> Option<&str> {
        self.inner.cell.get().map(|s| s.as_str())
    }

    /// The resolved value, or `UnresolvedDeferred`.
    pub fn require(&self) -> CoreResult<&str> {
        self.get().ok_or_else(|| CoreError::UnresolvedDeferred {
            reference: self.reference(),
        })
    }

    /// Resolve the value. Fails if it was already resolved.
    pub fn resolve(&self, value: impl Into<String>) -> CoreResult<()> {
        self.inner
            .cell
            .set(value.into())
            .map_err(|_| CoreError::AlreadyResolved {
                reference: self.reference(),
            })
    }

    /// Whether both handles share the same cell.
    pub fn same_cell(&self, other: &DeferredValue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("reference", &self.reference())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_resolved() {
        let value = DeferredValue::new(ResourceId::new("db"), "address");
        assert_eq!(value.state(), DeferredState::Pending);
        assert!(value.get().is_none());
        assert!(value.require().is_err());

        value.resolve("10.0.1.5").unwrap();
        assert_eq!(value.state(), DeferredState::Resolved);
        assert_eq!(value.get(), Some("10.0.1.5"));
    }

    #[test]
    fn test_resolves_exactly_once() {
        let value = DeferredValue::new(ResourceId::new("topic"), "arn");
        value.resolve("arn:1").unwrap();

        let err = value.resolve("arn:2").unwrap_err();
        assert!(matches!(err, CoreError::AlreadyResolved { .. }));
        assert_eq!(value.get(), Some("arn:1"));
    }

    #[test]
    fn test_clones_share_resolution() {
        let producer_side = DeferredValue::new(ResourceId::new("db"), "endpoint");
        let consumer_a = producer_side.clone();
        let consumer_b = producer_side.clone();

        producer_side.resolve("db.local:3306").unwrap();
        assert_eq!(consumer_a.get(), Some("db.local:3306"));
        assert_eq!(consumer_b.get(), Some("db.local:3306"));
        assert!(consumer_a.same_cell(&consumer_b));
    }
}
