//! Configuration file and environment secrets.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use community::{ConfigStore, GuildId, SettingKey};
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "ideaforge.toml";

fn default_prefix() -> String {
    "!".to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_database_url() -> String {
    "sqlite://ideaforge.db?mode=rwc".to_string()
}

/// A `[settings]` value. Channel ids and durations may be written as
/// integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(u64),
    Text(String),
}

impl SettingValue {
    fn render(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => value.trim().to_string(),
        }
    }
}

/// Contents of `ideaforge.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The one guild this deployment manages.
    pub guild_id: GuildId,
    /// Source-host organization teams and repositories are created in.
    pub organization: String,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Address the relay endpoint binds.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// OTLP gRPC endpoint. Traces are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub discord_api: Option<String>,
    #[serde(default)]
    pub github_api: Option<String>,
    /// Initial values for the Config store.
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.organization.trim().is_empty() {
            bail!("`organization` must not be empty");
        }
        if config.command_prefix.is_empty() {
            bail!("`command_prefix` must not be empty");
        }
        config.seed_values()?;
        Ok(config)
    }

    /// The `[settings]` table as store rows, validated.
    pub fn seed_values(&self) -> Result<Vec<(SettingKey, String)>> {
        self.settings
            .iter()
            .map(|(name, value)| {
                let Some(key) = SettingKey::parse(name) else {
                    bail!("unknown setting `{name}`");
                };
                let value = value.render();
                if value.parse::<u64>().is_err() {
                    bail!("setting `{name}` must be a non-negative integer, got `{value}`");
                }
                Ok((key, value))
            })
            .collect()
    }
}

/// Writes every configured setting the store does not hold yet. Values
/// already stored are left alone. Returns how many keys were written.
pub async fn seed_settings<S>(store: &S, values: &[(SettingKey, String)]) -> Result<usize>
where
    S: ConfigStore + ?Sized,
{
    let mut written = 0;
    for (key, value) in values {
        if store.setting(key.as_str()).await?.is_some() {
            continue;
        }
        store.set_setting(key.as_str(), value).await?;
        info!(key = %key, "seeded setting");
        written += 1;
    }
    Ok(written)
}

/// Credentials read from the environment.
pub struct Secrets {
    pub discord_token: String,
    pub github_token: String,
    pub relay_secret: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("environment variable {name} is not set"))
        };
        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            github_token: required("GITHUB_TOKEN")?,
            relay_secret: required("RELAY_SECRET")?,
        })
    }
}
