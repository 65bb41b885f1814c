//! Query statistics for observability.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters mutated by every query.
///
/// Relaxed atomics, so the read path needs no external locking.
#[derive(Debug, Default)]
pub struct QueryMetrics {
    queries: AtomicU64,
    pages_l1: AtomicU64,
    pages_l2: AtomicU64,
}

impl QueryMetrics {
    /// Creates a zeroed metrics container.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_queries(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_pages_l1(&self) {
        self.pages_l1.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_pages_l2(&self) {
        self.pages_l2.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            pages_l1: self.pages_l1.load(Ordering::Relaxed),
            pages_l2: self.pages_l2.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the query counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Public queries served.
    pub queries: u64,
    /// Pages probed by the page-level binary search.
    pub pages_l1: u64,
    /// Pages scanned in full for the nearest-not-greater entry.
    pub pages_l2: u64,
}

impl StatsSnapshot {
    /// Average pages touched per query.
    pub fn pages_per_query(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            (self.pages_l1 + self.pages_l2) as f64 / self.queries as f64
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queries: {}, L1 pages: {}, L2 pages: {} ({:.2} pages/query)",
            self.queries,
            self.pages_l1,
            self.pages_l2,
            self.pages_per_query()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = QueryMetrics::new();
        metrics.inc_queries();
        metrics.inc_queries();
        metrics.inc_pages_l1();
        metrics.inc_pages_l1();
        metrics.inc_pages_l1();
        metrics.inc_pages_l2();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries, 2);
        assert_eq!(snapshot.pages_l1, 3);
        assert_eq!(snapshot.pages_l2, 1);
        assert!((snapshot.pages_per_query() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = QueryMetrics::new().snapshot();
        assert_eq!(snapshot, StatsSnapshot::default());
        assert_eq!(snapshot.pages_per_query(), 0.0);
    }
}
