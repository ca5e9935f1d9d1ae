//! `cadenced` entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cadenced::config::Config;
use cadenced::runtime::{self, Components};

#[derive(Debug, Parser)]
#[command(name = "cadenced", version, about = "Recurring automation scheduler and trigger worker")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "CADENCE_CONFIG", default_value = "cadence.toml")]
    config: PathBuf,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Mode {
    /// Claim due automations and publish trigger messages.
    Scheduler,
    /// Consume trigger messages and invoke actions.
    Worker,
    /// Run scheduler and worker in one process.
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let components = Components::connect(&config).await?;
    tracing::info!(mode = ?cli.mode, database = %config.database.url, "cadenced starting");

    let cancel = CancellationToken::new();
    tokio::spawn(runtime::cancel_on_ctrl_c(cancel.clone()));

    let work = async {
        match cli.mode {
            Mode::Scheduler => runtime::run_scheduler(&config, &components, cancel.clone()).await,
            Mode::Worker => {
                runtime::run_worker(&config, &components, cancel.clone()).await;
                Ok(())
            }
            Mode::All => {
                let (scheduled, ()) = tokio::join!(
                    runtime::run_scheduler(&config, &components, cancel.clone()),
                    runtime::run_worker(&config, &components, cancel.clone()),
                );
                scheduled
            }
        }
    };
    tokio::pin!(work);

    tokio::select! {
        result = &mut work => result?,
        () = async {
            cancel.cancelled().await;
            tokio::time::sleep(runtime::SHUTDOWN_GRACE).await;
        } => tracing::warn!(grace = ?runtime::SHUTDOWN_GRACE, "loops did not stop in time, exiting"),
    }

    tracing::info!("cadenced stopped");
    Ok(())
}
