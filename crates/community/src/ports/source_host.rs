//! The source-hosting port.
//!
//! Covers the organization-level operations the workflow needs: user lookup,
//! organization teams, repositories and team membership. Lookups by name
//! return `Ok(None)` when nothing matches so callers can implement
//! get-or-create themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ExternalTeamId, ExternalUserId, RepositoryId, Timestamp};

#[derive(Debug, Error)]
pub enum SourceHostError {
    /// No account exists under the given username.
    #[error("unknown user '{login}'")]
    UnknownUser { login: String },

    /// A team, repository or user addressed by id does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Transport or API failure.
    #[error("source host API error: {message}")]
    Api { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: ExternalUserId,
    pub login: String,
    /// Display name, when the user set one.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTeam {
    pub id: ExternalTeamId,
    pub name: String,
    /// URL-safe team key used by the host's team endpoints.
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
}

/// Commits by one author in one week of a repository's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionWeek {
    pub author: ExternalUserId,
    /// Start of the week.
    pub week_start: Timestamp,
    pub commits: u32,
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Organization the adapter operates on.
    fn organization(&self) -> &str;

    /// Browser link to a team page, posted in the team channel.
    fn team_url(&self, team: &ExternalTeam) -> String;

    /// Browser link to a repository.
    fn repository_url(&self, repository: &Repository) -> String;

    async fn user_by_id(&self, id: ExternalUserId) -> Result<ExternalUser, SourceHostError>;

    /// Resolves a username. Fails with [`SourceHostError::UnknownUser`] when
    /// no such account exists.
    async fn user_by_login(&self, login: &str) -> Result<ExternalUser, SourceHostError>;

    async fn find_team(&self, name: &str) -> Result<Option<ExternalTeam>, SourceHostError>;

    async fn team_by_id(&self, id: ExternalTeamId) -> Result<Option<ExternalTeam>, SourceHostError>;

    /// Lists every team of the organization.
    async fn teams(&self) -> Result<Vec<ExternalTeam>, SourceHostError>;

    async fn create_team(&self, name: &str) -> Result<ExternalTeam, SourceHostError>;

    async fn delete_team(&self, team: &ExternalTeam) -> Result<(), SourceHostError>;

    async fn add_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError>;

    async fn remove_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError>;

    async fn find_repository(&self, name: &str) -> Result<Option<Repository>, SourceHostError>;

    async fn repository_by_id(&self, id: RepositoryId) -> Result<Option<Repository>, SourceHostError>;

    async fn create_repository(&self, name: &str) -> Result<Repository, SourceHostError>;

    async fn delete_repository(&self, repository: &Repository) -> Result<(), SourceHostError>;

    /// Grants `team` access to `repository`. Granting twice is harmless.
    async fn grant_team_repository(
        &self,
        team: &ExternalTeam,
        repository: &Repository,
    ) -> Result<(), SourceHostError>;

    /// Weekly commit counts per contributor. Empty while the host is still
    /// computing statistics.
    async fn contribution_weeks(
        &self,
        repository: &Repository,
    ) -> Result<Vec<ContributionWeek>, SourceHostError>;
}
