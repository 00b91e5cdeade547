//! Observable follower state: cursor, node height gauge, retry counter.
use std::sync::{
    atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use error_stack::{Result, ResultExt};

use crate::error::FollowerError;

/// Process-wide observable state of one follower.
///
/// Constructed once at setup and owned by the follower. Only the single
/// active run mutates it (the run guard enforces this); external readers
/// treat the fields as counters and gauges, never as synchronization points.
pub struct FollowerState {
    /// Next height the follower will request.
    next_height: AtomicU64,
    /// Latest height the node claims to have.
    node_height: AtomicU64,
    /// When the node height was last observed, unix milliseconds. 0 = never.
    node_height_observed_at: AtomicI64,
    /// Transient-failure retries since startup.
    retry_count: AtomicU64,
    /// A run is active.
    running: AtomicBool,
}

/// Read-only view of [`FollowerState`] for metrics scraping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub next_height: u64,
    pub node_height: u64,
    pub node_height_observed_at: Option<DateTime<Utc>>,
    pub retry_count: u64,
}

impl FollowerState {
    pub fn new(next_height: u64, node_height: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            next_height: AtomicU64::new(next_height),
            node_height: AtomicU64::new(node_height),
            node_height_observed_at: AtomicI64::new(observed_at.timestamp_millis()),
            retry_count: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    // Relaxed ordering throughout: there is exactly one writer and readers
    // only need eventually-consistent gauge values.

    pub fn next_height(&self) -> u64 {
        self.next_height.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next_height(&self, height: u64) {
        self.next_height.store(height, Ordering::Relaxed);
    }

    pub fn node_height(&self) -> u64 {
        self.node_height.load(Ordering::Relaxed)
    }

    pub(crate) fn observe_node_height(&self, height: u64, observed_at: DateTime<Utc>) {
        self.node_height.store(height, Ordering::Relaxed);
        self.node_height_observed_at
            .store(observed_at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let observed_at_millis = self.node_height_observed_at.load(Ordering::Relaxed);
        StateSnapshot {
            next_height: self.next_height(),
            node_height: self.node_height(),
            node_height_observed_at: (observed_at_millis != 0)
                .then(|| DateTime::from_timestamp_millis(observed_at_millis))
                .flatten(),
            retry_count: self.retry_count(),
        }
    }

    /// Mark a run as active.
    ///
    /// Non-blocking: if a run is already active this fails immediately
    /// without performing any I/O. The returned guard releases the flag on
    /// drop, on every exit path.
    pub fn try_acquire_run(self: &Arc<Self>) -> Result<RunGuard, FollowerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FollowerError::AlreadyRunning)
                .attach_printable("a follower run is already active");
        }
        Ok(RunGuard {
            state: self.clone(),
        })
    }
}

/// Token proving that its holder is the only active run.
pub struct RunGuard {
    state: Arc<FollowerState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}
