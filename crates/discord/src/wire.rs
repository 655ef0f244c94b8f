//! Discord JSON shapes and their conversion into domain types.
//!
//! Discord encodes every snowflake as a string; they are parsed into the
//! domain's `u64` newtypes here and nowhere else.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use community::{
    Category, CategoryId, Channel, ChannelKind, ChatError, Embed, EmbedField, Message,
    ReactionSummary, Role, RoleId, Timestamp, UserRef,
};
use serde::{Deserialize, Serialize};

use crate::client::platform;

/// `ADMINISTRATOR` permission bit.
pub(crate) const ADMINISTRATOR: u64 = 1 << 3;

/// `VIEW_CHANNEL` permission bit.
pub(crate) const VIEW_CHANNEL: u64 = 1 << 10;

pub(crate) const TEXT_CHANNEL: u8 = 0;
pub(crate) const VOICE_CHANNEL: u8 = 2;
pub(crate) const CATEGORY_CHANNEL: u8 = 4;

/// Permission overwrite targeting a role.
const OVERWRITE_ROLE: u8 = 0;

pub(crate) fn parse_id<T: FromStr>(raw: &str) -> Result<T, ChatError> {
    raw.parse()
        .map_err(|_| platform(format!("malformed snowflake '{raw}'")))
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

impl UserDto {
    pub fn to_ref(&self) -> Result<UserRef, ChatError> {
        Ok(UserRef {
            id: parse_id(&self.id)?,
            bot: self.bot,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EmbedFieldDto {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EmbedDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedFieldDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

impl From<EmbedDto> for Embed {
    fn from(dto: EmbedDto) -> Self {
        Embed {
            title: dto.title,
            fields: dto
                .fields
                .into_iter()
                .map(|f| EmbedField {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            colour: dto.color,
        }
    }
}

impl From<Embed> for EmbedDto {
    fn from(embed: Embed) -> Self {
        EmbedDto {
            title: embed.title,
            fields: embed
                .fields
                .into_iter()
                .map(|f| EmbedFieldDto {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            color: embed.colour,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmojiDto {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl EmojiDto {
    /// Unicode emoji by character, custom emoji as `name:id`.
    pub fn key(&self) -> String {
        match (&self.name, &self.id) {
            (Some(name), Some(id)) => format!("{name}:{id}"),
            (Some(name), None) => name.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReactionDto {
    pub count: u32,
    pub emoji: EmojiDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageDto {
    pub id: String,
    pub channel_id: String,
    pub author: UserDto,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<UserDto>,
    #[serde(default)]
    pub embeds: Vec<EmbedDto>,
    #[serde(default)]
    pub reactions: Vec<ReactionDto>,
    pub timestamp: DateTime<Utc>,
    pub edited_timestamp: Option<DateTime<Utc>>,
}

impl MessageDto {
    pub fn into_message(self) -> Result<Message, ChatError> {
        let mut mentions = self
            .mentions
            .iter()
            .map(UserDto::to_ref)
            .collect::<Result<Vec<_>, _>>()?;
        // Discord does not keep mention order; the content does.
        mentions.sort_by_key(|user| mention_position(&self.content, user));

        Ok(Message {
            id: parse_id(&self.id)?,
            channel_id: parse_id(&self.channel_id)?,
            author: self.author.to_ref()?,
            mentions,
            embeds: self.embeds.into_iter().map(Embed::from).collect(),
            reactions: self
                .reactions
                .into_iter()
                .map(|r| ReactionSummary {
                    emoji: r.emoji.key(),
                    count: r.count,
                })
                .collect(),
            created_at: Timestamp::from_utc(self.timestamp),
            edited_at: self.edited_timestamp.map(Timestamp::from_utc),
            content: self.content,
        })
    }
}

fn mention_position(content: &str, user: &UserRef) -> usize {
    [format!("<@{}>", user.id), format!("<@!{}>", user.id)]
        .iter()
        .filter_map(|pattern| content.find(pattern.as_str()))
        .min()
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Deserialize)]
pub(crate) struct GuildMemberDto {
    pub user: UserDto,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RoleDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: String,
}

impl RoleDto {
    pub fn is_administrator(&self) -> bool {
        self.permissions
            .parse::<u64>()
            .is_ok_and(|bits| bits & ADMINISTRATOR != 0)
    }

    pub fn to_role(&self) -> Result<Role, ChatError> {
        Ok(Role {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            administrator: self.is_administrator(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChannelDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl ChannelDto {
    pub fn is_category(&self) -> bool {
        self.kind == CATEGORY_CHANNEL
    }

    pub fn to_category(&self) -> Result<Category, ChatError> {
        Ok(Category {
            id: parse_id(&self.id)?,
            name: self.name.clone().unwrap_or_default(),
        })
    }

    pub fn to_channel(&self) -> Result<Channel, ChatError> {
        let category = self
            .parent_id
            .as_deref()
            .map(parse_id::<CategoryId>)
            .transpose()?;
        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name.clone().unwrap_or_default(),
            kind: if self.kind == VOICE_CHANNEL {
                ChannelKind::Voice
            } else {
                ChannelKind::Text
            },
            category,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DmChannelDto {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<EmbedDto>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditEmbeds {
    pub embeds: Vec<EmbedDto>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRole {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    pub hoist: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: String,
    pub deny: String,
}

impl PermissionOverwrite {
    /// Hides a channel from `everyone` and shows it to holders of `shown`.
    pub fn private_to(everyone: RoleId, shown: RoleId) -> Vec<Self> {
        vec![
            Self {
                id: everyone.to_string(),
                kind: OVERWRITE_ROLE,
                allow: "0".into(),
                deny: VIEW_CHANNEL.to_string(),
            },
            Self {
                id: shown.to_string(),
                kind: OVERWRITE_ROLE,
                allow: VIEW_CHANNEL.to_string(),
                deny: "0".into(),
            },
        ]
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateDm {
    pub recipient_id: String,
}
