//! Ideaforge entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `ideaforge.toml` and the secrets in the
//!    environment, and validate both.
//! 2. **Wire observability**: configure `tracing-subscriber` (compact or JSON)
//!    and, when an endpoint is configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the Discord and GitHub adapters, the
//!    store, and the relay event source. Seed the Config store.
//! 4. **Run**: flag in-flight workflows for recovery, then feed every relayed
//!    event to the [`workflow::Coordinator`] until the relay closes or the
//!    process is interrupted.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use community::{EventSource, Settings, Store, Timestamp};
use discord::DiscordChat;
use github::GitHubHost;
use listener::RelayEventSource;
use store::{MemoryStore, SqliteStore};
use tracing::{info, warn};
use workflow::{Coordinator, Services};

use crate::config::{seed_settings, Config, Secrets, DEFAULT_CONFIG_PATH};
use crate::telemetry::LogFormat;

/// Events buffered between the relay endpoint and the dispatch loop.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "ideaforge", version, about = "Turns community proposals into teams")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, env = "IDEAFORGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Keep all records in memory instead of the configured database.
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let telemetry = telemetry::init(cli.log_format, config.otlp_endpoint.as_deref())?;

    let outcome = run(&cli, config).await;
    if let Err(e) = &outcome {
        tracing::error!(error = %format!("{e:#}"), "ideaforge stopped");
    }
    telemetry.shutdown();
    outcome
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    let secrets = Secrets::from_env()?;

    let store: Arc<dyn Store> = if cli.ephemeral {
        warn!("running with an in-memory store; nothing will persist");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            SqliteStore::connect(&config.database_url)
                .await
                .with_context(|| format!("failed to open {}", config.database_url))?,
        )
    };
    let seeded = seed_settings(&*store, &config.seed_values()?).await?;
    info!(seeded, "config store ready");
    Settings::load(&*store)
        .await
        .context("the config store is incomplete; add the missing keys to [settings]")?;

    let chat = match &config.discord_api {
        Some(base) => DiscordChat::with_base_url(base, secrets.discord_token, config.guild_id),
        None => DiscordChat::new(secrets.discord_token, config.guild_id),
    }
    .context("failed to create the Discord client")?;
    let source = match &config.github_api {
        Some(base) => GitHubHost::with_base_url(base, secrets.github_token, &config.organization),
        None => GitHubHost::new(secrets.github_token, &config.organization),
    }
    .context("failed to create the GitHub client")?;

    let services = Services::new(
        Arc::new(chat),
        Arc::new(source),
        store,
        config.guild_id,
        Timestamp::now(),
    );
    let coordinator = Coordinator::new(services, config.command_prefix.clone());

    let mut events = RelayEventSource::bind(config.listen, secrets.relay_secret, EVENT_BUFFER)
        .await
        .context("failed to start the relay endpoint")?;

    let flagged = coordinator
        .recover()
        .await
        .context("failed to scan for in-flight workflows")?;
    info!(flagged, guild = %config.guild_id, "ideaforge online");

    loop {
        tokio::select! {
            event = events.next_event() => match event {
                Some(event) => {
                    coordinator.dispatch(event);
                }
                None => {
                    warn!("relay endpoint closed");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signals")?;
                info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
