//! Command grammar.
//!
//! Commands are a prefix, a name and arguments. Arguments are separated by
//! whitespace; double quotes group words into one argument.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MemberId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("please close all the quotation marks")]
    UnclosedQuote,

    #[error("'{0}' is not a member mention")]
    InvalidMember(String),
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    /// Start the interactive proposal flow.
    NewIdea,
    /// Join an existing team under an external username.
    AddMe { username: String, team: String },
    /// Leave a team.
    RemoveMe { team: String },
    /// Open leader voting for a team (admin).
    StartLeaderVoting { team: String },
    /// Provision a team directly, bypassing the vote (admin).
    CreateNewTeam { title: String },
    /// Tear a team down (admin).
    DeleteTeam { team: String },
    /// Warn members with no recent contributions (admin).
    ActivityCheck,
    /// Write a Config-store key (admin).
    SetSetting { key: String, value: String },
    /// Warn a member (admin).
    Warn { member: MemberId, reason: String },
    /// Remove a member from the guild (admin).
    Remove { member: MemberId, reason: String },
    /// Describe the voting and gathering windows.
    VotingInfo,
    /// List the configured channels.
    Channels,
}

impl Command {
    /// Parses `content` if it starts with `prefix`. Returns `None` for
    /// ordinary messages.
    pub fn parse(prefix: &str, content: &str) -> Option<Result<Self, CommandParseError>> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        Some(Self::parse_body(rest))
    }

    fn parse_body(body: &str) -> Result<Self, CommandParseError> {
        let mut args = split_arguments(body)?.into_iter();
        let name = args.next().unwrap_or_default();
        let mut next = |what: &'static str| {
            args.next()
                .filter(|a| !a.is_empty())
                .ok_or(CommandParseError::MissingArgument(what))
        };

        let command = match name.as_str() {
            "new_idea" => Self::NewIdea,
            "add_me" => Self::AddMe {
                username: next("github username")?,
                team: next("team name")?,
            },
            "remove_me" => Self::RemoveMe {
                team: next("team name")?,
            },
            "start_leader_voting" => Self::StartLeaderVoting {
                team: next("team name")?,
            },
            "create_new_team" => Self::CreateNewTeam {
                title: next("team name")?,
            },
            "delete_team" => Self::DeleteTeam {
                team: next("team name")?,
            },
            "activity_check" => Self::ActivityCheck,
            "set_setting" => Self::SetSetting {
                key: next("key")?,
                value: strip_channel_mention(&next("value")?),
            },
            "warn" => Self::Warn {
                member: parse_member(&next("member")?)?,
                reason: next("reason")?,
            },
            "remove" => Self::Remove {
                member: parse_member(&next("member")?)?,
                reason: next("reason")?,
            },
            "voting_info" => Self::VotingInfo,
            "channels" => Self::Channels,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }

    /// Commands reserved for administrators.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::StartLeaderVoting { .. }
                | Self::CreateNewTeam { .. }
                | Self::DeleteTeam { .. }
                | Self::ActivityCheck
                | Self::SetSetting { .. }
                | Self::Warn { .. }
                | Self::Remove { .. }
        )
    }
}

fn split_arguments(body: &str) -> Result<Vec<String>, CommandParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in body.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if quoted {
        return Err(CommandParseError::UnclosedQuote);
    }
    if pending {
        args.push(current);
    }
    Ok(args)
}

/// Accepts `<@123>`, `<@!123>` or a bare id.
fn parse_member(raw: &str) -> Result<MemberId, CommandParseError> {
    let inner = raw
        .strip_prefix("<@")
        .and_then(|r| r.strip_suffix('>'))
        .map(|r| r.trim_start_matches('!'))
        .unwrap_or(raw);
    inner
        .parse()
        .map_err(|_| CommandParseError::InvalidMember(raw.to_string()))
}

/// Turns `<#123>` into `123`; anything else is returned unchanged.
fn strip_channel_mention(raw: &str) -> String {
    raw.strip_prefix("<#")
        .and_then(|r| r.strip_suffix('>'))
        .unwrap_or(raw)
        .to_string()
}
