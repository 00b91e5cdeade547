use chrono::{DateTime, Utc};
use serde::Serialize;

/// Block is one resolved chain record.
///
/// Created only by the batch fetcher, immutable after construction. The
/// `results` payload is opaque to the follower and moves to the consumer
/// with the block.
#[derive(Debug, Clone, Serialize)]
pub struct Block<T> {
    /// Chain position (sequence identifier).
    pub height: u64,
    /// Establishment timestamp from the block header.
    pub time: DateTime<Utc>,
    /// Application result payload.
    pub results: T,
}

/// Block header metadata as returned by a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub height: u64,
    pub time: DateTime<Utc>,
}
