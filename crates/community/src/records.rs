//! Persisted records.
//!
//! These are the only pieces of workflow state kept outside the chat
//! platform. In-flight proposals and gathering windows are not persisted
//! here; they live in chat messages and are recovered from there.

use serde::{Deserialize, Serialize};

use crate::{
    CategoryId, ChannelId, ExternalTeamId, ExternalUserId, ExternalUsername, MemberId, RepositoryId,
    RoleId, Slug,
};

/// A provisioned team. Written once provisioning completes, keyed by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub slug: Slug,
    pub role_id: RoleId,
    pub leader_role_id: RoleId,
    pub category_id: CategoryId,
    /// The team's general text channel.
    pub channel_id: ChannelId,
    pub external_team_id: ExternalTeamId,
    pub repository_id: RepositoryId,
    /// Leader-voting sub-channel, once one has been opened.
    pub voting_channel_id: Option<ChannelId>,
}

/// A member's accepted external identity for one team. Unique per
/// `(member_id, team_slug)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMembership {
    pub member_id: MemberId,
    pub team_slug: Slug,
    pub external_username: ExternalUsername,
    pub external_user_id: ExternalUserId,
}

/// Warnings after which a member is removed from the guild.
pub const WARNINGS_BEFORE_REMOVAL: u32 = 3;
