//! Persistence ports.
//!
//! Four narrow traits mirror the four logical tables. [`Store`] bundles them
//! for callers that need all of them; any type implementing the four gets it
//! for free.

use async_trait::async_trait;
use thiserror::Error;

use crate::{ChannelId, ExternalTeamId, MemberId, Slug, Team, UserMembership};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("store backend error: {message}")]
    Backend { message: String },

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt record in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

/// Scalar settings keyed by name (see [`crate::SettingKey`]).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// All stored settings, sorted by key.
    async fn settings(&self) -> Result<Vec<(String, String)>, StoreError>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn team(&self, slug: &Slug) -> Result<Option<Team>, StoreError>;

    async fn team_by_external_id(&self, id: ExternalTeamId) -> Result<Option<Team>, StoreError>;

    /// Inserts or replaces the record keyed by `team.slug`.
    async fn save_team(&self, team: &Team) -> Result<(), StoreError>;

    async fn set_voting_channel(
        &self,
        slug: &Slug,
        channel: Option<ChannelId>,
    ) -> Result<(), StoreError>;

    async fn delete_team(&self, slug: &Slug) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn membership(
        &self,
        member: MemberId,
        slug: &Slug,
    ) -> Result<Option<UserMembership>, StoreError>;

    /// Inserts or replaces the record keyed by `(member_id, team_slug)`.
    async fn save_membership(&self, membership: &UserMembership) -> Result<(), StoreError>;

    async fn memberships_for_team(&self, slug: &Slug) -> Result<Vec<UserMembership>, StoreError>;

    async fn all_memberships(&self) -> Result<Vec<UserMembership>, StoreError>;

    /// Removes every membership recorded for `slug`.
    async fn delete_memberships_for_team(&self, slug: &Slug) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WarnStore: Send + Sync {
    /// Increments the member's warning count and returns the new value.
    async fn add_warning(&self, member: MemberId) -> Result<u32, StoreError>;

    async fn warnings(&self, member: MemberId) -> Result<u32, StoreError>;

    async fn clear_warnings(&self, member: MemberId) -> Result<(), StoreError>;
}

/// All persistence concerns in one bound.
pub trait Store: ConfigStore + TeamStore + UserStore + WarnStore {}

impl<T> Store for T where T: ConfigStore + TeamStore + UserStore + WarnStore {}
