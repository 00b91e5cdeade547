//! Node capability contract consumed by the follower.
mod tendermint;

use chrono::{DateTime, Utc};
use error_stack::Result;

use crate::core::BlockMeta;

pub use self::tendermint::{TendermintProvider, TendermintProviderOptions};

/// Summary of the chain as reported by the node.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    /// First height the node can serve.
    pub earliest_height: u64,
    /// Latest height the node claims to have.
    pub latest_height: u64,
    /// When `latest_height` was observed.
    pub observed_at: DateTime<Utc>,
}

/// Response to a historical range query.
///
/// The node returns metadata in descending height order per its own
/// pagination semantics. The follower validates this and treats violations
/// as fatal, it does not re-sort.
#[derive(Debug, Clone)]
pub struct RangeMetadata {
    pub metas: Vec<BlockMeta>,
    /// Latest height reported alongside the range response.
    pub latest_height: u64,
}

/// One entry of a batched result query, keyed by the height the node
/// reports for it.
#[derive(Debug, Clone)]
pub struct BlockResult<T> {
    pub height: u64,
    pub data: T,
}

#[derive(Debug)]
pub struct ProviderError;

impl error_stack::Context for ProviderError {}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node RPC error")
    }
}

/// Access to the remote consensus node.
#[async_trait::async_trait]
pub trait NodeProvider: Send + Sync {
    type Results: Send + Sync + 'static;

    /// Query the node's current status.
    async fn status(&self) -> Result<NodeStatus, ProviderError>;

    /// Query block header metadata for the inclusive range `[low, high]`.
    async fn block_range_metadata(
        &self,
        low: u64,
        high: u64,
    ) -> Result<RangeMetadata, ProviderError>;

    /// Fetch block results for the given heights as one grouped round trip.
    ///
    /// The returned entries must be positionally matched to `heights`; the
    /// follower validates the reported heights against the request.
    async fn batched_block_results(
        &self,
        heights: &[u64],
    ) -> Result<Vec<BlockResult<Self::Results>>, ProviderError>;
}
