//! Identifier allocation
//!
//! Canvas ids are opaque to the reconciliation core. Allocation sits behind a
//! trait so a deployment can plug in its own scheme.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::PresentationError;

/// Allocates unique identifiers within a customer
pub trait IdAllocator: Send + Sync {
    fn allocate(&self, customer_id: i32, count: usize) -> Result<Vec<String>, PresentationError>;
}

/// Random v4 UUIDs in simple (hyphenless) form
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdAllocator;

impl IdAllocator for UuidIdAllocator {
    fn allocate(&self, _customer_id: i32, count: usize) -> Result<Vec<String>, PresentationError> {
        Ok((0..count).map(|_| Uuid::new_v4().simple().to_string()).collect())
    }
}

/// Deterministic `{prefix}{n}` ids, for tests and fixtures
#[derive(Debug)]
pub struct SequentialIdAllocator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn allocate(&self, _customer_id: i32, count: usize) -> Result<Vec<String>, PresentationError> {
        let start = self.next.fetch_add(count as u64, Ordering::SeqCst);
        Ok((start..start + count as u64)
            .map(|n| format!("{}{}", self.prefix, n))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidIdAllocator.allocate(1, 50).unwrap();
        assert_eq!(ids.len(), 50);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);
        assert!(ids.iter().all(|id| !id.contains('-')));
    }

    #[test]
    fn test_sequential_ids_continue() {
        let allocator = SequentialIdAllocator::new("canvas-");
        assert_eq!(allocator.allocate(1, 2).unwrap(), vec!["canvas-1", "canvas-2"]);
        assert_eq!(allocator.allocate(1, 1).unwrap(), vec!["canvas-3"]);
    }
}
