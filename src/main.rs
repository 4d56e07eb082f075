//! artifact-poller command line entrypoint

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use artifact_poller::{
    config::Config,
    env,
    framework::{self, ArtifactOutcome, Outcome, StateTracker},
    shutdown,
};

/// Downloads and extracts the artifacts of the latest successful GitHub Actions run.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// The configuration file
    #[arg(short, long, env = env::CONFIG_PATH, default_value = "config.yaml")]
    config: PathBuf,

    /// Keep running and poll again every this many seconds instead of exiting after one pass
    #[arg(short, long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let states = StateTracker::new();

    let Some(interval) = cli.interval else {
        let outcome = framework::run(&config, &states).await?;
        report(&outcome);
        return Ok(());
    };

    info!("polling every {interval}s, press Ctrl + C to stop");
    let interval = Duration::from_secs(interval);
    let shutdown = shutdown::signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = framework::run(&config, &states) => match result {
                Ok(outcome) => report(&outcome),
                Err(err) => error!("polling pass failed: {err:#}"),
            },
            () = &mut shutdown => break,
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = &mut shutdown => break,
        }
    }

    Ok(())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::NoRun => info!("no successful run found, nothing to do"),
        Outcome::NoArtifacts { run_id } => info!("run {run_id} has no artifacts, nothing to do"),
        Outcome::Finished { run_id, artifacts } => {
            for artifact in artifacts {
                match artifact {
                    ArtifactOutcome::Processed { name, id, files } => info!(
                        "{name} ({id}): extracted {} file(s), kept {}",
                        files.written.len(),
                        files.retained.len()
                    ),
                    ArtifactOutcome::Unchanged { name, id } => info!("{name} ({id}): unchanged"),
                    ArtifactOutcome::Expired { name, id } => info!("{name} ({id}): expired"),
                    ArtifactOutcome::Missing { name } => info!("{name}: not found"),
                    _ => {}
                }
            }
            info!(
                "run {run_id}: processed {} of {} artifact(s)",
                outcome.processed(),
                artifacts.len()
            );
        }
        _ => {}
    }
}
