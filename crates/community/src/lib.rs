//! Core domain for Ideaforge, a community bot that turns proposals into teams.
//!
//! This crate contains every domain concept, newtype identifier, workflow rule
//! and port trait used by the rest of the workspace. Infrastructure crates
//! implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business rules + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; adapter crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`MemberId`, `RoleId`, `ExternalTeamId`, ...) |
//! | [`slug`] | Title normalization into the unique team key |
//! | [`time`] | Timestamps and the time-wait calculator |
//! | [`quota`] | Vote and identity-gathering thresholds |
//! | [`proposal`] | Proposals, trials and their embed layout |
//! | [`markers`] | Reading workflow markers back out of chat messages |
//! | [`records`] | Persisted team and membership records |
//! | [`settings`] | Typed view of the Config store |
//! | [`commands`] | Command grammar |
//! | [`ports`] | `ChatPlatform`, `SourceHost`, store traits, `EventSource` |
//! | [`errors`] | Domain error taxonomy |

pub mod commands;
pub mod errors;
pub mod identifiers;
pub mod markers;
pub mod ports;
pub mod proposal;
pub mod quota;
pub mod records;
pub mod settings;
pub mod slug;
pub mod time;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use commands::{Command, CommandParseError};
pub use errors::{CommunityError, ErrorKind};
pub use identifiers::{
    CategoryId, ChannelId, ExternalTeamId, ExternalUserId, ExternalUsername, GuildId, MemberId,
    MessageId, RepositoryId, RoleId, TaskId,
};
pub use markers::{solicitation_embed, Marker, MarkerKind};
pub use ports::chat::{
    Category, Channel, ChannelKind, ChannelSpec, ChatError, ChatPlatform, Embed, EmbedField, Member,
    Message, OutgoingMessage, ReactionSummary, Role, RoleSpec, UserRef, APPROVAL_EMOJI,
    CELEBRATION_EMOJI, RESTART_EMOJI,
};
pub use ports::events::{ChatEvent, EventSource};
pub use ports::source_host::{
    ContributionWeek, ExternalTeam, ExternalUser, Repository, SourceHost, SourceHostError,
};
pub use ports::store::{ConfigStore, Store, StoreError, TeamStore, UserStore, WarnStore};
pub use proposal::{sanitize_field, Proposal, ProposalDraft, Trial};
pub use quota::{gathering_quota_met, required_ratio, votes_sufficient, MAX_TRIAL};
pub use records::{Team, UserMembership, WARNINGS_BEFORE_REMOVAL};
pub use settings::{SettingKey, Settings};
pub use slug::{Slug, SlugError, MAX_MANUAL_TEAM_TITLE_CHARS, MAX_TITLE_CHARS};
pub use time::{remaining_wait, Hms, Timestamp, WaitRemaining};
