use clap::{ArgAction, Parser, Subcommand};

use crate::cli::{auth::AuthCommand, refresh::RefreshCommand};

pub(crate) fn get_args() -> CliOpts {
    CliOpts::parse()
}

#[derive(Debug, Parser)]
#[command(version = clap::crate_version!(), about = "Discord to EVE Online identity linkage")]
pub(crate) struct CliOpts {
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    subcmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Identity linkage and credential administration.
    Auth(AuthCommand),

    /// Credential refresh sweeps.
    Refresh(RefreshCommand),
}

impl CliOpts {
    pub(crate) fn verbose(&self) -> u8 {
        self.verbose
    }

    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        match &self.subcmd {
            Command::Auth(cmd) => cmd.run().await,
            Command::Refresh(cmd) => cmd.run().await,
        }
    }
}
