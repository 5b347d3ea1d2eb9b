use std::time::Duration;

use clap::{Args, Subcommand};
use corplink_app::{RefreshCycleConfig, SweepReport};
use tokio::sync::watch;

use crate::cli::common::{build_refresh_sweeper, load_sso_config};

#[derive(Debug, Args)]
pub(crate) struct RefreshCommand {
    #[command(subcommand)]
    subcmd: RefreshSubcommand,
}

#[derive(Debug, Subcommand)]
enum RefreshSubcommand {
    /// Run a single refresh sweep and print the report.
    Once(OnceCommand),

    /// Run recurring sweeps until interrupted.
    Watch(WatchCommand),
}

impl RefreshCommand {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        match &self.subcmd {
            RefreshSubcommand::Once(cmd) => cmd.run().await,
            RefreshSubcommand::Watch(cmd) => cmd.run().await,
        }
    }
}

#[derive(Debug, Args)]
struct OnceCommand {
    /// Refresh everything expiring within this many seconds.
    #[arg(long, default_value_t = 3_600)]
    horizon_secs: u64,
}

impl OnceCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let config = load_sso_config()?;
        let cycle = RefreshCycleConfig {
            horizon: Duration::from_secs(self.horizon_secs),
            ..RefreshCycleConfig::default()
        };
        let sweeper = build_refresh_sweeper(&config, cycle).await?;

        match sweeper.try_sweep().await? {
            Some(report) => print_report(&report),
            None => println!("A sweep is already in flight; nothing to do."),
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
struct WatchCommand {
    /// Seconds between sweeps.
    #[arg(long, default_value_t = 3_600)]
    interval_secs: u64,

    /// Refresh everything expiring within this many seconds.
    #[arg(long, default_value_t = 3_600)]
    horizon_secs: u64,
}

impl WatchCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let config = load_sso_config()?;
        let cycle = RefreshCycleConfig {
            interval: Duration::from_secs(self.interval_secs),
            horizon: Duration::from_secs(self.horizon_secs),
            ..RefreshCycleConfig::default()
        };
        let sweeper = build_refresh_sweeper(&config, cycle).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });

        println!(
            "Sweeping every {}s with a {}s horizon; ctrl-c to stop.",
            self.interval_secs, self.horizon_secs
        );
        sweeper.run_until_shutdown(shutdown_rx).await;
        Ok(())
    }
}

fn print_report(report: &SweepReport) {
    println!(
        "Sweep complete: {} refreshed, {} need re-authorization, {} store failures.",
        report.refreshed.len(),
        report.needs_reauth.len(),
        report.store_failures.len()
    );

    for record in &report.refreshed {
        println!("  refreshed {} ({})", record.discord_id, record.character_name);
    }
    for discord_id in &report.needs_reauth {
        println!("  needs reauth: {discord_id}");
    }
    for (discord_id, detail) in &report.store_failures {
        println!("  store failure for {discord_id}: {detail}");
    }
}
