//! Proposals and the embed layout that persists them.
//!
//! A proposal has no row in the store. Its message in the idea channel is
//! the record: the embed title is the slug and the `Trials` field is the
//! trial counter, rewritten after every unsuccessful polling round.

use serde::{Deserialize, Serialize};

use crate::{Embed, MemberId, Message, MessageId, Slug, Timestamp, MAX_TRIAL};

pub const FIELD_EXPLANATION: &str = "Idea Explanation";
pub const FIELD_LANGUAGE: &str = "Programming Language";
pub const FIELD_TRIALS: &str = "Trials";

/// Proposal embed colour.
pub const PROPOSAL_COLOUR: u32 = 0x00ff00;

/// Characters stripped from free-text proposal fields before posting.
pub const STRIPPED_CHARS: [char; 6] = ['`', '"', '*', '_', '@', '#'];

/// Removes [`STRIPPED_CHARS`] and surrounding whitespace.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Index of a polling round, bounded by [`MAX_TRIAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Trial(u8);

impl Trial {
    pub const FIRST: Trial = Trial(0);

    /// Returns `None` above [`MAX_TRIAL`].
    pub fn new(value: u8) -> Option<Self> {
        (value <= MAX_TRIAL).then_some(Self(value))
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// The following round, or `None` once the last round has been used.
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn is_last(self) -> bool {
        self.0 == MAX_TRIAL
    }
}

impl std::fmt::Display for Trial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated proposal that has not been posted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDraft {
    pub slug: Slug,
    pub explanation: String,
    pub language: String,
}

impl ProposalDraft {
    /// Sanitizes the free-text fields.
    pub fn new(slug: Slug, explanation: &str, language: &str) -> Self {
        Self {
            slug,
            explanation: sanitize_field(explanation),
            language: sanitize_field(language),
        }
    }

    /// Embed shown to the author for confirmation.
    pub fn preview_embed(&self) -> Embed {
        let mut embed = Embed::titled(self.slug.as_str())
            .with_field(FIELD_EXPLANATION, self.explanation.clone())
            .with_field(FIELD_LANGUAGE, self.language.clone());
        embed.colour = Some(PROPOSAL_COLOUR);
        embed
    }

    /// Embed posted to the idea channel, carrying the trial counter.
    pub fn posting_embed(&self) -> Embed {
        self.preview_embed()
            .with_field(FIELD_TRIALS, Trial::FIRST.to_string())
    }
}

/// A proposal read back from its idea-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: MessageId,
    pub slug: Slug,
    pub explanation: String,
    pub language: String,
    pub trial: Trial,
    pub created_at: Timestamp,
    /// First mentioned user: the member who proposed it.
    pub owner: Option<MemberId>,
}

impl Proposal {
    /// Reads a proposal from a bot-authored idea-channel message. Returns
    /// `None` for anything else.
    pub fn from_message(message: &Message) -> Option<Self> {
        if !message.author.bot {
            return None;
        }
        let embed = message.primary_embed()?;
        let slug = Slug::parse(embed.title.as_deref()?).ok()?;
        let trial = embed
            .field(FIELD_TRIALS)
            .and_then(|v| v.trim().parse::<u8>().ok())
            .and_then(Trial::new)?;
        Some(Self {
            id: message.id,
            slug,
            explanation: embed.field(FIELD_EXPLANATION).unwrap_or_default().to_string(),
            language: embed.field(FIELD_LANGUAGE).unwrap_or_default().to_string(),
            trial,
            created_at: message.created_at,
            owner: message.mentions.first().map(|m| m.id),
        })
    }

    /// The message's embed with the trial counter replaced.
    pub fn embed_with_trial(message: &Message, trial: Trial) -> Option<Embed> {
        let mut embed = message.primary_embed()?.clone();
        embed.set_field(FIELD_TRIALS, trial.to_string());
        Some(embed)
    }
}
