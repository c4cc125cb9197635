#![forbid(unsafe_code)]

//! Positional reconciliation of repeated regions.
//!
//! Item `i` of the previous render is reused for item `i` of the next one
//! whenever both exist. Surplus trailing items are disposed and missing
//! trailing items created. Key expressions do not change identity: a reorder
//! rebinds items in place.

use std::ops::Range;

/// Which positions to keep, create and dispose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Indices reused and rebound.
    pub retained: Range<usize>,
    /// Indices (in the next sequence) to create.
    pub created: Range<usize>,
    /// Indices (in the previous sequence) to dispose.
    pub disposed: Range<usize>,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.disposed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListReconciler;

impl ListReconciler {
    #[must_use]
    pub fn plan(prev_len: usize, next_len: usize) -> ReconcilePlan {
        let shared = prev_len.min(next_len);
        ReconcilePlan {
            retained: 0..shared,
            created: shared..next_len,
            disposed: shared..prev_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_shrink_and_same() {
        assert_eq!(
            ListReconciler::plan(2, 3),
            ReconcilePlan {
                retained: 0..2,
                created: 2..3,
                disposed: 2..2
            }
        );
        assert_eq!(
            ListReconciler::plan(4, 1),
            ReconcilePlan {
                retained: 0..1,
                created: 1..1,
                disposed: 1..4
            }
        );
        assert!(ListReconciler::plan(2, 2).is_noop());
        assert_eq!(ListReconciler::plan(0, 0).retained, 0..0);
    }
}
