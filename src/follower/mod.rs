//! The chain follower: control loop, batch fetcher, and observable state.
mod fetch;
mod service;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use self::service::{ChainFollower, FollowerOptions};
pub use self::state::{FollowerState, RunGuard, StateSnapshot};
