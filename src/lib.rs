//! Ordered, gapless block ingestion from a Tendermint node.
//!
//! The follower reads a chain's sequential block history from a remote
//! consensus node and republishes it, in strict height order and without
//! gaps or duplicates, over a bounded stream. Event decoding, persistence,
//! and query serving all live downstream and depend on this crate's
//! ordering and completeness guarantees.
pub mod cli;
pub mod core;
pub mod error;
pub mod follower;
pub mod provider;

pub use self::core::{Block, BlockMeta};
pub use self::error::{FollowerError, ReportExt, Result};
pub use self::follower::{ChainFollower, FollowerOptions, FollowerState, StateSnapshot};
pub use self::provider::{
    BlockResult, NodeProvider, NodeStatus, ProviderError, RangeMetadata, TendermintProvider,
    TendermintProviderOptions,
};
