//! The chat-platform port.
//!
//! [`ChatPlatform`] is everything the workflow asks of the chat service:
//! message history, messages with structured embeds, reactions, roles,
//! channels, membership and direct messages. Adapters translate these calls
//! into a concrete platform API; the workflow never sees transport details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CategoryId, ChannelId, MemberId, MessageId, RoleId, Timestamp};

/// Approval reaction used for proposal votes and leader candidacy.
pub const APPROVAL_EMOJI: &str = "\u{1F44D}";

/// Reaction the bot attaches to in-flight workflow messages found at start-up.
pub const RESTART_EMOJI: &str = "\u{1F504}";

/// Celebration emoji repeated once per voter in an approval announcement.
pub const CELEBRATION_EMOJI: &str = "\u{1F973}";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`ChatPlatform`] implementation.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The addressed message, channel, role or member does not exist (any more).
    #[error("{what} not found")]
    NotFound { what: String },

    /// The platform refused the call (closed DMs, missing permission, hierarchy).
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    /// Any other platform or transport failure.
    #[error("chat platform error: {message}")]
    Platform { message: String },
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A named value inside an [`Embed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A structured message attachment. The workflow stores its durable markers
/// (slug, trial count, guild) in embeds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    pub colour: Option<u32>,
}

impl Embed {
    /// An embed with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Builder-style field append.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    /// Value of the first field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Replaces the value of `name`, appending the field when absent.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(EmbedField {
                name: name.to_string(),
                value,
                inline: true,
            }),
        }
    }
}

/// Reaction summary attached to a fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
}

/// The author (or a mentioned user) of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub id: MemberId,
    pub bot: bool,
}

/// A message as fetched from a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserRef,
    pub content: String,
    /// Mentioned users in the order they appear in the content.
    #[serde(default)]
    pub mentions: Vec<UserRef>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub reactions: Vec<ReactionSummary>,
    pub created_at: Timestamp,
    pub edited_at: Option<Timestamp>,
}

impl Message {
    /// The timestamp timed phases are measured from: the edit time when the
    /// message was edited, otherwise the creation time.
    pub fn anchor(&self) -> Timestamp {
        self.edited_at.unwrap_or(self.created_at)
    }

    /// The first embed, which is where every workflow marker lives.
    pub fn primary_embed(&self) -> Option<&Embed> {
        self.embeds.first()
    }

    /// Title of the first embed.
    pub fn embed_title(&self) -> Option<&str> {
        self.primary_embed().and_then(|e| e.title.as_deref())
    }

    /// `true` when `member` is mentioned.
    pub fn mentions_member(&self, member: MemberId) -> bool {
        self.mentions.iter().any(|m| m.id == member)
    }
}

/// Content of a message to post.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    pub embed: Option<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embed: None,
        }
    }

    pub fn with_embed(content: impl Into<String>, embed: Embed) -> Self {
        Self {
            content: content.into(),
            embed: Some(embed),
        }
    }
}

// ---------------------------------------------------------------------------
// Guild structure
// ---------------------------------------------------------------------------

/// A guild member with the parts of their state the workflow consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub bot: bool,
    pub roles: Vec<RoleId>,
    /// Holds the administrator permission through any role.
    pub administrator: bool,
}

impl Member {
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }

    pub fn as_user(&self) -> UserRef {
        UserRef {
            id: self.id,
            bot: self.bot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub administrator: bool,
}

/// Parameters for a new role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub colour: Option<u32>,
    /// Display members holding the role separately in the member list.
    pub hoist: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub category: Option<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Parameters for a new channel. When `visible_to` is set, only holders of
/// that role can view the channel and it is hidden from the default role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub kind: ChannelKind,
    pub category: Option<CategoryId>,
    pub visible_to: Option<RoleId>,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The chat service as seen by the workflow.
///
/// All lookups that can legitimately miss return `Ok(None)`; `ChatError::NotFound`
/// is reserved for calls that address something that must exist.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    // -- messages ----------------------------------------------------------

    async fn fetch_message(&self, channel: ChannelId, message: MessageId)
        -> Result<Message, ChatError>;

    /// Recent messages in `channel`, newest first.
    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError>;

    /// Replaces the embeds of a bot-authored message. Marks it edited.
    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: Embed,
    ) -> Result<Message, ChatError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ChatError>;

    // -- reactions ---------------------------------------------------------

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ChatError>;

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> Result<(), ChatError>;

    /// Users who reacted with `emoji`, in the order the platform returns them.
    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<UserRef>, ChatError>;

    // -- members -----------------------------------------------------------

    /// `None` when the user is not (or no longer) a guild member.
    async fn member(&self, member: MemberId) -> Result<Option<Member>, ChatError>;

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError>;

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError>;

    async fn kick(&self, member: MemberId, reason: &str) -> Result<(), ChatError>;

    /// Sends a direct message. Fails with `ChatError::Forbidden` when the member
    /// does not accept DMs from the bot.
    async fn send_direct(
        &self,
        member: MemberId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError>;

    // -- roles -------------------------------------------------------------

    async fn role(&self, role: RoleId) -> Result<Option<Role>, ChatError>;

    async fn find_role(&self, name: &str) -> Result<Option<Role>, ChatError>;

    async fn create_role(&self, spec: RoleSpec) -> Result<Role, ChatError>;

    async fn set_role_hoist(&self, role: RoleId, hoist: bool) -> Result<(), ChatError>;

    async fn delete_role(&self, role: RoleId) -> Result<(), ChatError>;

    /// Current holders of `role`.
    async fn role_members(&self, role: RoleId) -> Result<Vec<Member>, ChatError>;

    // -- channels ----------------------------------------------------------

    async fn category(&self, category: CategoryId) -> Result<Option<Category>, ChatError>;

    async fn find_category(&self, name: &str) -> Result<Option<Category>, ChatError>;

    async fn create_category(
        &self,
        name: &str,
        visible_to: Option<RoleId>,
    ) -> Result<Category, ChatError>;

    async fn delete_category(&self, category: CategoryId) -> Result<(), ChatError>;

    async fn category_channels(&self, category: CategoryId) -> Result<Vec<Channel>, ChatError>;

    async fn channel(&self, channel: ChannelId) -> Result<Option<Channel>, ChatError>;

    async fn create_channel(&self, spec: ChannelSpec) -> Result<Channel, ChatError>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError>;
}
