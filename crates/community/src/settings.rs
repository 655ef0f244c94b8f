//! Runtime workflow settings.
//!
//! Settings live in the Config store so operators can change them while the
//! bot runs. Workflow steps call [`Settings::load`] after every suspension
//! instead of caching values across a wait.

use std::time::Duration;

use crate::{ChannelId, CommunityError, ConfigStore};

/// Keys of the Config store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Channel where proposals are posted and voted on.
    IdeaChannel,
    /// Channel for countdowns, approvals and gathering announcements.
    OverviewChannel,
    /// Fallback channel for solicitations that could not be sent by DM.
    MessagesChannel,
    /// Channel announcing teams that are up and running.
    RunningChannel,
    /// Moderation log: warnings, removals, activity reports.
    BotChannel,
    /// Channel listing finished projects.
    FinishedChannel,
    /// Voting window per trial, in seconds.
    TimeToWait,
    /// Identity-gathering window, in seconds.
    GithubSleepTime,
    /// Votes a proposal must exceed to be approved.
    RequiredVotes,
}

impl SettingKey {
    pub const ALL: [SettingKey; 9] = [
        SettingKey::IdeaChannel,
        SettingKey::OverviewChannel,
        SettingKey::MessagesChannel,
        SettingKey::RunningChannel,
        SettingKey::BotChannel,
        SettingKey::FinishedChannel,
        SettingKey::TimeToWait,
        SettingKey::GithubSleepTime,
        SettingKey::RequiredVotes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdeaChannel => "idea-channel",
            Self::OverviewChannel => "overview-channel",
            Self::MessagesChannel => "messages-channel",
            Self::RunningChannel => "running-channel",
            Self::BotChannel => "bot-channel",
            Self::FinishedChannel => "finished-channel",
            Self::TimeToWait => "time-to-wait",
            Self::GithubSleepTime => "github-sleep-time",
            Self::RequiredVotes => "required-votes",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// `true` for keys whose value is a channel id.
    pub fn is_channel(self) -> bool {
        self.as_str().ends_with("-channel")
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed snapshot of the Config store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub idea_channel: ChannelId,
    pub overview_channel: ChannelId,
    pub messages_channel: ChannelId,
    pub running_channel: ChannelId,
    pub bot_channel: ChannelId,
    pub finished_channel: ChannelId,
    pub voting_window: Duration,
    pub gathering_window: Duration,
    pub required_votes: usize,
}

impl Settings {
    /// Reads every setting from `store`. A missing or malformed key is a
    /// configuration error.
    pub async fn load<S: ConfigStore + ?Sized>(store: &S) -> Result<Self, CommunityError> {
        let mut values = Vec::with_capacity(SettingKey::ALL.len());
        for key in SettingKey::ALL {
            let value = store
                .setting(key.as_str())
                .await
                .map_err(|e| CommunityError::Configuration {
                    message: e.to_string(),
                })?;
            values.push((key, value));
        }
        tracing::debug!(keys = values.len(), "loaded settings from config store");
        Self::from_values(|key| {
            values
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.clone())
        })
    }

    /// Builds settings from a key lookup.
    pub fn from_values(
        lookup: impl Fn(SettingKey) -> Option<String>,
    ) -> Result<Self, CommunityError> {
        let raw = |key: SettingKey| {
            lookup(key).ok_or_else(|| CommunityError::Configuration {
                message: format!("setting '{key}' is not set"),
            })
        };
        let number = |key: SettingKey| -> Result<u64, CommunityError> {
            let value = raw(key)?;
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| CommunityError::Configuration {
                    message: format!("setting '{key}' must be a non-negative integer, got '{value}'"),
                })
        };
        let channel = |key: SettingKey| number(key).map(ChannelId::new);

        Ok(Self {
            idea_channel: channel(SettingKey::IdeaChannel)?,
            overview_channel: channel(SettingKey::OverviewChannel)?,
            messages_channel: channel(SettingKey::MessagesChannel)?,
            running_channel: channel(SettingKey::RunningChannel)?,
            bot_channel: channel(SettingKey::BotChannel)?,
            finished_channel: channel(SettingKey::FinishedChannel)?,
            voting_window: Duration::from_secs(number(SettingKey::TimeToWait)?),
            gathering_window: Duration::from_secs(number(SettingKey::GithubSleepTime)?),
            required_votes: number(SettingKey::RequiredVotes)? as usize,
        })
    }

    /// Channels as `(key, id)` pairs, for the channel listing command.
    pub fn channels(&self) -> [(SettingKey, ChannelId); 6] {
        [
            (SettingKey::IdeaChannel, self.idea_channel),
            (SettingKey::OverviewChannel, self.overview_channel),
            (SettingKey::MessagesChannel, self.messages_channel),
            (SettingKey::RunningChannel, self.running_channel),
            (SettingKey::BotChannel, self.bot_channel),
            (SettingKey::FinishedChannel, self.finished_channel),
        ]
    }
}
