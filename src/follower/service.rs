//! The chain follower control loop.
use std::{sync::Arc, time::Duration};

use error_stack::{Result, ResultExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    core::Block,
    error::FollowerError,
    provider::NodeProvider,
};

use super::{
    fetch::BatchFetcher,
    state::{FollowerState, StateSnapshot},
};

#[derive(Debug, Clone)]
pub struct FollowerOptions {
    /// Number of blocks fetched and validated per batch. A tuning constant,
    /// not a correctness constant.
    pub batch_size: u64,
    /// Wait between retries and lag polls.
    pub poll_interval: Duration,
    /// Height to start from. Defaults to the node's earliest block.
    pub start_height: Option<u64>,
    /// Output channel capacity. A slow consumer stalls the fetch loop; this
    /// is the follower's only flow-control mechanism.
    pub channel_size: usize,
}

impl Default for FollowerOptions {
    fn default() -> Self {
        Self {
            batch_size: 40,
            poll_interval: Duration::from_secs(7),
            start_height: None,
            channel_size: 64,
        }
    }
}

/// Follows a chain from a node, republishing its blocks in strict height
/// order with no gaps or duplicates.
pub struct ChainFollower<P>
where
    P: NodeProvider,
{
    provider: P,
    state: Arc<FollowerState>,
    options: FollowerOptions,
}

impl<P> ChainFollower<P>
where
    P: NodeProvider,
{
    /// Establish the connection to the node.
    ///
    /// Performs the initial status query and initializes the cursor to the
    /// node's earliest height (or `options.start_height` when resuming) and
    /// the node height gauge to the latest reported height.
    pub async fn connect(provider: P, options: FollowerOptions) -> Result<Self, FollowerError> {
        if options.batch_size == 0 {
            return Err(FollowerError::Configuration)
                .attach_printable("batch size must be at least 1");
        }

        let status = provider
            .status()
            .await
            .change_context(FollowerError::Temporary)
            .attach_printable("initial status query failed")?;

        info!(
            earliest_height = status.earliest_height,
            latest_height = status.latest_height,
            "connected to node"
        );

        let start_height = options.start_height.unwrap_or(status.earliest_height);
        let state = Arc::new(FollowerState::new(
            start_height,
            status.latest_height,
            status.observed_at,
        ));

        Ok(Self {
            provider,
            state,
            options,
        })
    }

    /// Observable state handle, safe to read concurrently with a run.
    pub fn state(&self) -> Arc<FollowerState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Spawn the follower and return the output stream.
    ///
    /// The stream ends when the run terminates; the join handle carries the
    /// termination cause.
    pub fn start(
        self: Arc<Self>,
        ct: CancellationToken,
    ) -> (
        ReceiverStream<Block<P::Results>>,
        tokio::task::JoinHandle<Result<(), FollowerError>>,
    )
    where
        P: 'static,
    {
        let (tx, rx) = mpsc::channel(self.options.channel_size);
        let handle = tokio::spawn(async move { self.run(tx, ct).await });
        (ReceiverStream::new(rx), handle)
    }

    /// Follow the chain from the current cursor, delivering blocks to `tx`.
    ///
    /// Runs until cancelled or until the node violates a protocol guarantee;
    /// the return is always an error describing which. `tx` is dropped on
    /// exit, closing the stream and signaling end-of-data to the consumer at
    /// the same moment.
    pub async fn run(
        &self,
        tx: mpsc::Sender<Block<P::Results>>,
        ct: CancellationToken,
    ) -> Result<(), FollowerError> {
        let _guard = self.state.try_acquire_run()?;
        info!(start_height = self.state.next_height(), "starting follower");
        self.run_loop(tx, ct).await
    }

    async fn run_loop(
        &self,
        tx: mpsc::Sender<Block<P::Results>>,
        ct: CancellationToken,
    ) -> Result<(), FollowerError> {
        let fetcher = BatchFetcher::new(&self.provider, &self.state);
        let mut reported_synced = false;

        loop {
            let offset = self.state.next_height();

            // The node has nothing new: wait out a poll interval, refresh the
            // status, and try again.
            if self.state.node_height() < offset {
                if !reported_synced {
                    reported_synced = true;
                    report_progress(offset, self.state.node_height());
                }
                self.wait_interval(&ct, "waiting for new blocks").await?;
                match self.provider.status().await {
                    Ok(status) => {
                        self.state
                            .observe_node_height(status.latest_height, status.observed_at);
                        debug!(
                            node_height = status.latest_height,
                            cursor = offset,
                            "status refreshed"
                        );
                    }
                    Err(err) => {
                        self.state.record_retry();
                        warn!(error = ?err, "status query failed, retrying");
                    }
                }
                continue;
            }

            let outcome = match fetcher.fetch(offset, self.options.batch_size).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let FollowerError::Protocol = err.current_context() {
                        return Err(err).attach_printable_lazy(|| {
                            format!("node violated protocol consistency at height {offset}")
                        });
                    }
                    self.state.record_retry();
                    warn!(error = ?err, height = offset, "block fetch failed, retrying");
                    self.wait_interval(&ct, "backing off after fetch error")
                        .await?;
                    continue;
                }
            };

            let mut blocks = outcome.blocks;
            if outcome.remaining_lag < 0 {
                // The batch overran the chain tip: the node now reports fewer
                // blocks than were just resolved. Keep only what the node
                // still stands behind and re-approach the tip.
                let overrun = outcome.remaining_lag.unsigned_abs() as usize;
                let keep = blocks.len().saturating_sub(overrun);
                warn!(
                    height = offset,
                    overrun,
                    keep,
                    "node reports height behind resolved batch, trimming"
                );
                blocks.truncate(keep);
            }

            if blocks.is_empty() {
                reported_synced = false;
                self.wait_interval(&ct, "no blocks resolved").await?;
                continue;
            }

            reported_synced = false;
            for block in blocks {
                let height = block.height;
                tokio::select! {
                    _ = ct.cancelled() => {
                        return Err(FollowerError::Cancelled).attach_printable_lazy(|| {
                            format!("cancelled before delivering block {height}")
                        });
                    }
                    permit = tx.reserve() => {
                        let Ok(permit) = permit else {
                            return Err(FollowerError::Cancelled)
                                .attach_printable("output stream closed by consumer");
                        };
                        permit.send(block);
                        self.state.set_next_height(height + 1);
                        if (height + 1) % 10_000 == 0 {
                            report_progress(height + 1, self.state.node_height());
                        }
                    }
                }
            }
        }
    }

    /// One poll/backoff wait, racing cancellation.
    async fn wait_interval(&self, ct: &CancellationToken, reason: &str) -> Result<(), FollowerError> {
        tokio::select! {
            _ = ct.cancelled() => {
                Err(FollowerError::Cancelled)
                    .attach_printable_lazy(|| format!("cancelled while {reason}"))
            }
            _ = tokio::time::sleep(self.options.poll_interval) => Ok(()),
        }
    }
}

fn report_progress(next_height: u64, node_height: u64) {
    let current = next_height.saturating_sub(1);
    if current >= node_height {
        info!(height = current, "fully synced");
    } else {
        let progress = 100.0 * current as f64 / node_height as f64;
        info!(
            height = current,
            progress = format!("{progress:.2}%"),
            "syncing"
        );
    }
}
