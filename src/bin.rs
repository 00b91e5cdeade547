use std::process::ExitCode;

use blockfollow::{
    cli::FollowerArgs, Block, ChainFollower, FollowerError, ReportExt, TendermintProvider,
};
use clap::Parser;
use error_stack::{Result, ResultExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Follow a Tendermint chain and stream its blocks in order")]
struct Cli {
    #[command(flatten)]
    follower: FollowerArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    run_with_args(args).await.to_exit_code()
}

async fn run_with_args(args: Cli) -> Result<(), FollowerError> {
    init_tracing();

    let ct = CancellationToken::new();
    ctrlc::set_handler({
        let ct = ct.clone();
        move || {
            info!("SIGINT received");
            ct.cancel();
        }
    })
    .change_context(FollowerError::Configuration)
    .attach_printable("failed to set SIGINT handler")?;

    let provider = TendermintProvider::new(args.follower.rpc_url()?, args.follower.provider_options())
        .change_context(FollowerError::Configuration)
        .attach_printable("failed to create Tendermint RPC client")?;

    let options = args.follower.follower_options();
    let channel_size = options.channel_size;
    let follower = ChainFollower::connect(provider, options).await?;

    let (tx, mut rx) = mpsc::channel::<Block<serde_json::Value>>(channel_size);
    let consumer = tokio::spawn(async move {
        let mut count: u64 = 0;
        while let Some(block) = rx.recv().await {
            count += 1;
            debug!(height = block.height, "block received");
            if count % 1000 == 0 {
                info!(height = block.height, count, "blocks ingested");
            }
        }
        count
    });

    let result = follower.run(tx, ct).await;

    if let Ok(count) = consumer.await {
        info!(count, "output stream closed");
    }

    match result {
        Err(err) if matches!(err.current_context(), FollowerError::Cancelled) => {
            info!("follower stopped: cancelled");
            Ok(())
        }
        other => other,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
