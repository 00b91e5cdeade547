//! Command line configuration.
use std::time::Duration;

use clap::Args;
use error_stack::{Result, ResultExt};
use url::Url;

use crate::{
    error::FollowerError,
    follower::FollowerOptions,
    provider::TendermintProviderOptions,
};

#[derive(Args, Debug, Clone)]
pub struct FollowerArgs {
    /// Tendermint JSON-RPC endpoint, e.g. http://localhost:26657.
    #[arg(long, env = "BLOCKFOLLOW_RPC_URL")]
    pub rpc_url: String,
    /// Number of blocks fetched and validated per batch.
    #[arg(long, env = "BLOCKFOLLOW_BATCH_SIZE", default_value_t = 40)]
    pub batch_size: u64,
    /// Seconds to wait between retries and lag polls.
    #[arg(long, env = "BLOCKFOLLOW_POLL_INTERVAL", default_value_t = 7)]
    pub poll_interval: u64,
    /// Per-request timeout in seconds.
    #[arg(long, env = "BLOCKFOLLOW_REQUEST_TIMEOUT", default_value_t = 8)]
    pub request_timeout: u64,
    /// Height to resume from. Defaults to the node's earliest block.
    #[arg(long, env = "BLOCKFOLLOW_START_HEIGHT")]
    pub start_height: Option<u64>,
    /// Output channel capacity.
    #[arg(long, env = "BLOCKFOLLOW_CHANNEL_SIZE", default_value_t = 64)]
    pub channel_size: usize,
}

impl FollowerArgs {
    pub fn rpc_url(&self) -> Result<Url, FollowerError> {
        Url::parse(&self.rpc_url)
            .change_context(FollowerError::Configuration)
            .attach_printable_lazy(|| format!("malformed RPC URL: {}", self.rpc_url))
    }

    pub fn follower_options(&self) -> FollowerOptions {
        FollowerOptions {
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(self.poll_interval),
            start_height: self.start_height,
            channel_size: self.channel_size,
        }
    }

    pub fn provider_options(&self) -> TendermintProviderOptions {
        TendermintProviderOptions {
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::FollowerArgs;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        follower: FollowerArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test", "--rpc-url", "http://localhost:26657"]);
        let args = cli.follower;
        assert_eq!(args.batch_size, 40);
        assert_eq!(args.poll_interval, 7);
        assert_eq!(args.start_height, None);
        assert_eq!(args.channel_size, 64);
        assert!(args.rpc_url().is_ok());
    }

    #[test]
    fn test_rejects_malformed_url() {
        let cli = TestCli::parse_from(["test", "--rpc-url", "not a url"]);
        assert!(cli.follower.rpc_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = TestCli::parse_from([
            "test",
            "--rpc-url",
            "http://localhost:26657",
            "--batch-size",
            "20",
            "--start-height",
            "1000",
        ]);
        let options = cli.follower.follower_options();
        assert_eq!(options.batch_size, 20);
        assert_eq!(options.start_height, Some(1000));
    }
}
