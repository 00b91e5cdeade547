//! Scripted in-memory provider for follower tests.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, TimeZone, Utc};
use error_stack::{Result, ResultExt};

use crate::{
    core::BlockMeta,
    provider::{BlockResult, NodeProvider, NodeStatus, ProviderError, RangeMetadata},
};

type Scripted<T> = std::result::Result<T, ()>;

/// Node provider that replays scripted responses.
///
/// Each queue pops one response per call; the final entry repeats forever so
/// loop tests can keep polling. Popping an empty queue panics, which surfaces
/// as a test failure.
pub(crate) struct ScriptedProvider {
    statuses: Mutex<VecDeque<Scripted<NodeStatus>>>,
    ranges: Mutex<VecDeque<Scripted<RangeMetadata>>>,
    results: Mutex<VecDeque<Scripted<Vec<BlockResult<u64>>>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            ranges: Mutex::new(VecDeque::new()),
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_status(self, earliest_height: u64, latest_height: u64) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(NodeStatus {
            earliest_height,
            latest_height,
            observed_at: Utc::now(),
        }));
        self
    }

    pub fn push_status_err(self) -> Self {
        self.statuses.lock().unwrap().push_back(Err(()));
        self
    }

    pub fn push_range(self, metas: Vec<BlockMeta>, latest_height: u64) -> Self {
        self.ranges.lock().unwrap().push_back(Ok(RangeMetadata {
            metas,
            latest_height,
        }));
        self
    }

    pub fn push_range_err(self) -> Self {
        self.ranges.lock().unwrap().push_back(Err(()));
        self
    }

    pub fn push_results(self, results: Vec<BlockResult<u64>>) -> Self {
        self.results.lock().unwrap().push_back(Ok(results));
        self
    }

    pub fn push_results_err(self) -> Self {
        self.results.lock().unwrap().push_back(Err(()));
        self
    }

    /// Total node calls performed so far, across all capabilities.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next<T: Clone>(&self, queue: &Mutex<VecDeque<Scripted<T>>>, what: &str) -> Scripted<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("scripted {what} responses exhausted"))
        }
    }
}

#[async_trait::async_trait]
impl NodeProvider for ScriptedProvider {
    type Results = u64;

    async fn status(&self) -> Result<NodeStatus, ProviderError> {
        self.next(&self.statuses, "status")
            .map_err(|_| ProviderError)
            .attach_printable("scripted status failure")
    }

    async fn block_range_metadata(
        &self,
        _low: u64,
        _high: u64,
    ) -> Result<RangeMetadata, ProviderError> {
        self.next(&self.ranges, "range")
            .map_err(|_| ProviderError)
            .attach_printable("scripted range failure")
    }

    async fn batched_block_results(
        &self,
        _heights: &[u64],
    ) -> Result<Vec<BlockResult<u64>>, ProviderError> {
        self.next(&self.results, "results")
            .map_err(|_| ProviderError)
            .attach_printable("scripted results failure")
    }
}

pub(crate) fn block_time(height: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_600_000_000 + height as i64 * 6, 0).unwrap()
}

/// Header metadata for `[low, high]` in the node's descending order.
pub(crate) fn descending_metas(low: u64, high: u64) -> Vec<BlockMeta> {
    (low..=high)
        .rev()
        .map(|height| BlockMeta {
            height,
            time: block_time(height),
        })
        .collect()
}

/// Block results for `[low, high]` in ascending (request) order. The payload
/// echoes the height.
pub(crate) fn block_results(low: u64, high: u64) -> Vec<BlockResult<u64>> {
    (low..=high)
        .map(|height| BlockResult {
            height,
            data: height,
        })
        .collect()
}
