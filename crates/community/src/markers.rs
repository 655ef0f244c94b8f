//! Durable workflow markers.
//!
//! Every in-flight workflow leaves a bot-authored embed message behind whose
//! title is the slug. Which kind of marker a message is depends on where it
//! was found, so callers say which [`MarkerKind`] they are looking for.

use serde::{Deserialize, Serialize};

use crate::{Embed, GuildId, Message, MessageId, Proposal, Slug, Timestamp, Trial, UserRef};

pub const FIELD_IDEA: &str = "Idea";
pub const FIELD_GUILD: &str = "Guild ID";

/// Where a marker lives and what it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Proposal under vote, in the idea channel.
    Proposal,
    /// Approval announcement anchoring a gathering window, in the overview channel.
    Gathering,
    /// Identity request sent to one participant, in a DM or the fallback channel.
    Solicitation,
    /// Announcement of a provisioned team, in the running channel.
    Running,
}

/// A marker recovered from a chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Proposal {
        message: MessageId,
        slug: Slug,
        trial: Trial,
        anchor: Timestamp,
    },
    Gathering {
        message: MessageId,
        slug: Slug,
        anchor: Timestamp,
        /// Everyone mentioned in the announcement: the full participant list.
        participants: Vec<UserRef>,
    },
    Solicitation {
        message: MessageId,
        slug: Slug,
        guild: Option<GuildId>,
        /// The solicited participant.
        recipient: Option<UserRef>,
    },
    Running {
        message: MessageId,
        slug: Slug,
    },
}

impl Marker {
    /// Interprets `message` as a marker of `kind`. Messages not authored by a
    /// bot, without an embed, or whose embed title is not a slug are not
    /// markers.
    pub fn read(kind: MarkerKind, message: &Message) -> Option<Self> {
        if !message.author.bot {
            return None;
        }
        let slug = Slug::parse(message.embed_title()?).ok()?;
        match kind {
            MarkerKind::Proposal => {
                let proposal = Proposal::from_message(message)?;
                Some(Self::Proposal {
                    message: message.id,
                    slug,
                    trial: proposal.trial,
                    anchor: message.anchor(),
                })
            }
            MarkerKind::Gathering => Some(Self::Gathering {
                message: message.id,
                slug,
                anchor: message.anchor(),
                participants: message.mentions.clone(),
            }),
            MarkerKind::Solicitation => {
                let embed = message.primary_embed()?;
                Some(Self::Solicitation {
                    message: message.id,
                    slug,
                    guild: embed.field(FIELD_GUILD).and_then(|g| g.parse().ok()),
                    recipient: message.mentions.first().copied(),
                })
            }
            MarkerKind::Running => Some(Self::Running {
                message: message.id,
                slug,
            }),
        }
    }

    pub fn slug(&self) -> &Slug {
        match self {
            Self::Proposal { slug, .. }
            | Self::Gathering { slug, .. }
            | Self::Solicitation { slug, .. }
            | Self::Running { slug, .. } => slug,
        }
    }

    pub fn message(&self) -> MessageId {
        match self {
            Self::Proposal { message, .. }
            | Self::Gathering { message, .. }
            | Self::Solicitation { message, .. }
            | Self::Running { message, .. } => *message,
        }
    }
}

/// Embed for an identity request.
pub fn solicitation_embed(slug: &Slug, guild: GuildId) -> Embed {
    Embed::titled(slug.as_str())
        .with_field(FIELD_IDEA, slug.as_str())
        .with_field(FIELD_GUILD, guild.to_string())
}
