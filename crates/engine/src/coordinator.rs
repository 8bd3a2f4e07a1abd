//! Invocation coordinator
//!
//! Allocates transaction ids and keeps lifecycle metrics for process
//! invocations:
//! - Transactions started, committed and rolled back
//! - Unchecked (transaction-less) runs
//! - Commit rate calculation

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Transaction id allocation and invocation metrics
///
/// # Memory Ordering
///
/// Counters use Relaxed ordering: they are observational only and do not
/// synchronize any other memory.
#[derive(Debug)]
pub struct InvocationCoordinator {
    /// Next transaction id (ids start at 1)
    next_txn_id: AtomicU64,
    /// Transactions begun but not yet resolved
    active_count: AtomicU64,
    /// Total transactions started
    total_started: AtomicU64,
    /// Total transactions committed
    total_committed: AtomicU64,
    /// Total transactions rolled back
    total_rolled_back: AtomicU64,
    /// Total unchecked runs
    total_unchecked: AtomicU64,
}

impl InvocationCoordinator {
    /// Create a coordinator with all counters at zero
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_rolled_back: AtomicU64::new(0),
            total_unchecked: AtomicU64::new(0),
        }
    }

    /// Allocate a transaction id and record the start
    pub fn start_transaction(&self, process: &str) -> u64 {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
        debug!(target: "pop::engine", txn_id, process, "Invocation started");
        txn_id
    }

    /// Record transaction commit
    ///
    /// Decrements active count (saturating at 0) and increments committed count.
    pub fn record_commit(&self, txn_id: u64, process: &str) {
        self.decrement_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
        info!(target: "pop::engine", txn_id, process, "Invocation committed");
    }

    /// Record transaction rollback
    pub fn record_rollback(&self, txn_id: u64, process: &str, error_kind: &str) {
        self.decrement_active();
        self.total_rolled_back.fetch_add(1, Ordering::Relaxed);
        warn!(target: "pop::engine", txn_id, process, error_kind, "Invocation rolled back");
    }

    /// Record a run of an unchecked process
    pub fn record_unchecked(&self, process: &str) {
        self.total_unchecked.fetch_add(1, Ordering::Relaxed);
        debug!(target: "pop::engine", process, "Unchecked invocation");
    }

    fn decrement_active(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Get invocation metrics
    ///
    /// Returns current snapshot of invocation statistics.
    pub fn metrics(&self) -> InvocationMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        InvocationMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_rolled_back: self.total_rolled_back.load(Ordering::Relaxed),
            total_unchecked: self.total_unchecked.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for InvocationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Invocation metrics
#[derive(Debug, Clone)]
pub struct InvocationMetrics {
    /// Transactions currently open
    pub active_count: u64,
    /// Total transactions started
    pub total_started: u64,
    /// Total transactions committed
    pub total_committed: u64,
    /// Total transactions rolled back
    pub total_rolled_back: u64,
    /// Total unchecked runs
    pub total_unchecked: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl InvocationMetrics {
    /// Transactions that were resolved (committed + rolled back)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_rolled_back
    }

    /// Rollback rate (rolled back / started)
    pub fn rollback_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_rolled_back as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_new() {
        let coordinator = InvocationCoordinator::new();
        let metrics = coordinator.metrics();
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.total_started, 0);
        assert_eq!(metrics.total_committed, 0);
        assert_eq!(metrics.total_rolled_back, 0);
        assert_eq!(metrics.commit_rate, 0.0);
    }

    #[test]
    fn test_txn_ids_are_monotonic() {
        let coordinator = InvocationCoordinator::new();
        let a = coordinator.start_transaction("p");
        let b = coordinator.start_transaction("p");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(coordinator.metrics().active_count, 2);
    }

    #[test]
    fn test_metrics_helpers() {
        let coordinator = InvocationCoordinator::new();
        for _ in 0..4 {
            coordinator.start_transaction("p");
        }
        coordinator.record_commit(1, "p");
        coordinator.record_commit(2, "p");
        coordinator.record_commit(3, "p");
        coordinator.record_rollback(4, "p", "ValidationError");
        coordinator.record_unchecked("raw");

        let metrics = coordinator.metrics();
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.total_completed(), 4);
        assert_eq!(metrics.commit_rate, 0.75);
        assert_eq!(metrics.rollback_rate(), 0.25);
        assert_eq!(metrics.total_unchecked, 1);
    }

    #[test]
    fn test_active_count_saturates() {
        let coordinator = InvocationCoordinator::new();
        coordinator.record_rollback(9, "p", "KeyError");
        assert_eq!(coordinator.metrics().active_count, 0);
    }
}
