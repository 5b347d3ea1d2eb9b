use std::{collections::HashMap, time::Duration};

use clap::{Args, Subcommand};
use corplink_app::{link_status_report, remove_link};
use corplink_core::{DiscordId, Timestamp};
use corplink_store::CredentialStore;

use crate::cli::common::{
    build_link_service, connect_store, load_sso_config, print_record, print_status_line,
    wait_for_callback,
};

#[derive(Debug, Args)]
pub(crate) struct AuthCommand {
    #[command(subcommand)]
    subcmd: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Print an authorization URL to hand to a Discord user.
    Url(UrlCommand),

    /// Run the full login flow with a local callback listener.
    Link(LinkCommand),

    /// Complete a callback manually from a code and state.
    Callback(CallbackCommand),

    /// List linked accounts with their credential status.
    Status(StatusCommand),

    /// Remove a linked account.
    Remove(RemoveCommand),
}

impl AuthCommand {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        match &self.subcmd {
            AuthSubcommand::Url(cmd) => cmd.run().await,
            AuthSubcommand::Link(cmd) => cmd.run().await,
            AuthSubcommand::Callback(cmd) => cmd.run().await,
            AuthSubcommand::Status(cmd) => cmd.run().await,
            AuthSubcommand::Remove(cmd) => cmd.run().await,
        }
    }
}

#[derive(Debug, Args)]
struct UrlCommand {
    #[arg(long)]
    discord_id: String,

    #[arg(long)]
    discord_name: String,
}

impl UrlCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let config = load_sso_config()?;
        let service = build_link_service(&config).await?;

        let login =
            service.begin_authorization(&DiscordId::new(&self.discord_id), &self.discord_name)?;

        println!("{}", login.authorization_url);
        Ok(())
    }
}

#[derive(Debug, Args)]
struct LinkCommand {
    #[arg(long)]
    discord_id: String,

    #[arg(long)]
    discord_name: String,
}

impl LinkCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let config = load_sso_config()?;
        let service = build_link_service(&config).await?;

        let login =
            service.begin_authorization(&DiscordId::new(&self.discord_id), &self.discord_name)?;
        println!(
            "Open this URL in your browser:\n\n{}\n",
            login.authorization_url
        );
        println!("Waiting for the callback on {}", config.callback_url);

        let (code, state) = wait_for_callback(&config.callback_url)?;
        let confirmation = service.complete_callback(code.trim(), state.trim()).await?;

        println!(
            "Linked {} ({}) to {}",
            confirmation.discord_name, confirmation.discord_id, confirmation.character_name
        );
        match (
            &confirmation.affiliation.alliance,
            &confirmation.affiliation.corporation,
        ) {
            (Some(alliance), Some(corporation)) => println!(
                "Affiliation: [{}] {} / [{}] {}",
                alliance.ticker, alliance.name, corporation.ticker, corporation.name
            ),
            (None, Some(corporation)) => {
                println!("Affiliation: [{}] {}", corporation.ticker, corporation.name);
            }
            _ => println!("Affiliation could not be resolved; it will catch up on refresh."),
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
struct CallbackCommand {
    #[arg(long)]
    code: String,

    #[arg(long)]
    state: String,
}

impl CallbackCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let config = load_sso_config()?;
        let service = build_link_service(&config).await?;

        let confirmation = service.complete_callback(&self.code, &self.state).await?;
        println!(
            "Linked {} ({}) to {}",
            confirmation.discord_name, confirmation.discord_id, confirmation.character_name
        );
        Ok(())
    }
}

#[derive(Debug, Args)]
struct StatusCommand {
    /// Lookahead window used for the near-expiry classification, in seconds.
    #[arg(long, default_value_t = 3_600)]
    horizon_secs: u64,

    #[arg(long)]
    json: bool,
}

impl StatusCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let store = connect_store().await?;

        // a cold process has no sweeper failure memory; expired records
        // still classify as needs-reauth
        let entries = link_status_report(
            &store,
            &HashMap::new(),
            Timestamp::now(),
            Duration::from_secs(self.horizon_secs),
        )
        .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("No linked accounts.");
            return Ok(());
        }

        for entry in &entries {
            print_status_line(entry);
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
struct RemoveCommand {
    #[arg(long)]
    discord_id: String,
}

impl RemoveCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let store = connect_store().await?;
        let discord_id = DiscordId::new(&self.discord_id);

        match store.get(&discord_id).await? {
            Some(record) => {
                print_record(&record);
                remove_link(&store, &discord_id).await?;
                println!("Removed the link for {discord_id}.");
            }
            None => println!("No link found for {discord_id}."),
        }
        Ok(())
    }
}
