//! Batched block fetch and validation.
use chrono::Utc;
use error_stack::{Result, ResultExt};

use crate::{
    core::Block,
    error::FollowerError,
    provider::NodeProvider,
};

use super::state::FollowerState;

/// Outcome of one batch fetch.
pub(crate) struct FetchOutcome<T> {
    /// Resolved blocks in ascending height order.
    pub blocks: Vec<Block<T>>,
    /// Reported node height minus the last resolved height (minus the start
    /// height when nothing resolved). Negative means the node reports being
    /// behind what was just resolved.
    pub remaining_lag: i64,
}

/// Resolves up to `capacity` fully validated blocks per call.
pub(crate) struct BatchFetcher<'a, P> {
    provider: &'a P,
    state: &'a FollowerState,
}

impl<'a, P> BatchFetcher<'a, P>
where
    P: NodeProvider,
{
    pub fn new(provider: &'a P, state: &'a FollowerState) -> Self {
        Self { provider, state }
    }

    /// Fetch metadata for `[start_height, start_height + capacity - 1]`,
    /// validate it, and resolve the matching block results as one grouped
    /// round trip.
    ///
    /// The node's pagination behavior is otherwise unverified: accepting
    /// unordered or out-of-range metadata would silently corrupt the cursor,
    /// so both are protocol failures. The same goes for a batched result
    /// reporting a height other than the one requested at its position.
    pub async fn fetch(
        &self,
        start_height: u64,
        capacity: u64,
    ) -> Result<FetchOutcome<P::Results>, FollowerError> {
        let last = start_height + capacity - 1;
        let range = self
            .provider
            .block_range_metadata(start_height, last)
            .await
            .change_context(FollowerError::Temporary)
            .attach_printable_lazy(|| {
                format!("block range metadata query failed for {start_height}-{last}")
            })?;

        // Record the freshest reported node height even if validation below
        // fails.
        self.state.observe_node_height(range.latest_height, Utc::now());

        // The node paginates in descending [!] height order.
        for pair in range.metas.windows(2) {
            if pair[1].height >= pair[0].height {
                return Err(FollowerError::Protocol).attach_printable(format!(
                    "block range metadata for {start_height}-{last} got height {} after {}",
                    pair[1].height, pair[0].height
                ));
            }
        }

        let Some((first, last_meta)) = range.metas.first().zip(range.metas.last()) else {
            return Ok(FetchOutcome {
                blocks: Vec::new(),
                remaining_lag: range.latest_height as i64 - start_height as i64,
            });
        };

        let (high, low) = (first.height, last_meta.height);
        if high > last || low < start_height {
            return Err(FollowerError::Protocol).attach_printable(format!(
                "block range metadata for {start_height}-{last} got {low}-{high}"
            ));
        }

        let heights: Vec<u64> = range.metas.iter().rev().map(|meta| meta.height).collect();
        let results = self
            .provider
            .batched_block_results(&heights)
            .await
            .change_context(FollowerError::Temporary)
            .attach_printable_lazy(|| format!("batched block results failed for {low}-{high}"))?;

        if results.len() != heights.len() {
            return Err(FollowerError::Protocol).attach_printable(format!(
                "batched block results for {low}-{high}: requested {} results, got {}",
                heights.len(),
                results.len()
            ));
        }

        // Batched execution can reorder or partially fail independent of
        // request order; match every result back to its requested height.
        let mut blocks = Vec::with_capacity(results.len());
        for (meta, result) in range.metas.iter().rev().zip(results) {
            if result.height != meta.height {
                return Err(FollowerError::Protocol).attach_printable(format!(
                    "block results for {} got height {} instead",
                    meta.height, result.height
                ));
            }
            blocks.push(Block {
                height: meta.height,
                time: meta.time,
                results: result.data,
            });
        }

        let last_resolved = blocks[blocks.len() - 1].height;
        Ok(FetchOutcome {
            blocks,
            remaining_lag: range.latest_height as i64 - last_resolved as i64,
        })
    }
}
