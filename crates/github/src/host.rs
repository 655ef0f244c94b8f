//! [`SourceHost`] over the GitHub REST API.

use async_trait::async_trait;
use community::{
    ContributionWeek, ExternalTeam, ExternalTeamId, ExternalUser, ExternalUserId, Repository,
    RepositoryId, SourceHost, SourceHostError, Timestamp,
};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::client::{api, decode, RestClient, DEFAULT_API_BASE};

const WEB_BASE: &str = "https://github.com";
const PER_PAGE: usize = 100;

/// Access level granted to a team on its repository.
const TEAM_PERMISSION: &str = "push";

#[derive(Debug, Deserialize)]
struct UserDto {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
}

impl From<UserDto> for ExternalUser {
    fn from(dto: UserDto) -> Self {
        ExternalUser {
            id: ExternalUserId::new(dto.id),
            login: dto.login,
            name: dto.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: u64,
    name: String,
    slug: String,
}

impl From<TeamDto> for ExternalTeam {
    fn from(dto: TeamDto) -> Self {
        ExternalTeam {
            id: ExternalTeamId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryDto {
    id: u64,
    name: String,
}

impl From<RepositoryDto> for Repository {
    fn from(dto: RepositoryDto) -> Self {
        Repository {
            id: RepositoryId::new(dto.id),
            name: dto.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthorDto {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WeekDto {
    /// Week start, Unix seconds.
    w: i64,
    /// Commits.
    c: u32,
}

#[derive(Debug, Deserialize)]
struct ContributorDto {
    author: Option<AuthorDto>,
    #[serde(default)]
    weeks: Vec<WeekDto>,
}

fn flatten_contributors(contributors: Vec<ContributorDto>) -> Vec<ContributionWeek> {
    contributors
        .into_iter()
        .filter_map(|c| c.author.map(|a| (ExternalUserId::new(a.id), c.weeks)))
        .flat_map(|(author, weeks)| {
            weeks.into_iter().filter_map(move |week| {
                Some(ContributionWeek {
                    author,
                    week_start: Timestamp::from_unix_seconds(week.w)?,
                    commits: week.c,
                })
            })
        })
        .collect()
}

/// Source host bound to one organization.
pub struct GitHubHost {
    rest: RestClient,
    organization: String,
}

impl GitHubHost {
    pub fn new(token: impl Into<String>, organization: impl Into<String>) -> Result<Self, SourceHostError> {
        Self::with_base_url(DEFAULT_API_BASE, token, organization)
    }

    pub fn with_base_url(
        base: &str,
        token: impl Into<String>,
        organization: impl Into<String>,
    ) -> Result<Self, SourceHostError> {
        Ok(Self {
            rest: RestClient::new(base, token.into())?,
            organization: organization.into(),
        })
    }

    async fn get_optional<T: for<'de> Deserialize<'de>>(
        &self,
        url: reqwest::Url,
    ) -> Result<Option<T>, SourceHostError> {
        match self.rest.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(SourceHostError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn membership_url(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<reqwest::Url, SourceHostError> {
        self.rest.url(&[
            &"orgs",
            &self.organization,
            &"teams",
            &team.slug,
            &"memberships",
            &user.login,
        ])
    }
}

#[async_trait]
impl SourceHost for GitHubHost {
    fn organization(&self) -> &str {
        &self.organization
    }

    fn team_url(&self, team: &ExternalTeam) -> String {
        format!("{WEB_BASE}/orgs/{}/teams/{}", self.organization, team.slug)
    }

    fn repository_url(&self, repository: &Repository) -> String {
        format!("{WEB_BASE}/{}/{}", self.organization, repository.name)
    }

    async fn user_by_id(&self, id: ExternalUserId) -> Result<ExternalUser, SourceHostError> {
        let url = self.rest.url(&[&"user", &id])?;
        self.rest.get::<UserDto>(url).await.map(ExternalUser::from)
    }

    async fn user_by_login(&self, login: &str) -> Result<ExternalUser, SourceHostError> {
        let login = login.trim();
        if login.is_empty() {
            return Err(SourceHostError::UnknownUser {
                login: String::new(),
            });
        }
        let url = self.rest.url(&[&"users", &login])?;
        match self.rest.get::<UserDto>(url).await {
            Ok(user) => Ok(user.into()),
            Err(SourceHostError::NotFound { .. }) => Err(SourceHostError::UnknownUser {
                login: login.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn find_team(&self, name: &str) -> Result<Option<ExternalTeam>, SourceHostError> {
        Ok(self.teams().await?.into_iter().find(|t| t.name == name))
    }

    async fn team_by_id(&self, id: ExternalTeamId) -> Result<Option<ExternalTeam>, SourceHostError> {
        Ok(self.teams().await?.into_iter().find(|t| t.id == id))
    }

    async fn teams(&self) -> Result<Vec<ExternalTeam>, SourceHostError> {
        let mut teams = Vec::new();
        for page in 1.. {
            let mut url = self.rest.url(&[&"orgs", &self.organization, &"teams"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let batch: Vec<TeamDto> = self.rest.get(url).await?;
            let last = batch.len() < PER_PAGE;
            teams.extend(batch.into_iter().map(ExternalTeam::from));
            if last {
                break;
            }
        }
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn create_team(&self, name: &str) -> Result<ExternalTeam, SourceHostError> {
        let url = self.rest.url(&[&"orgs", &self.organization, &"teams"])?;
        let body = json!({ "name": name, "privacy": "closed" });
        let team: TeamDto = self.rest.send_json(Method::POST, url, &body).await?;
        info!(team = %team.slug, "organization team created");
        Ok(team.into())
    }

    async fn delete_team(&self, team: &ExternalTeam) -> Result<(), SourceHostError> {
        let url = self
            .rest
            .url(&[&"orgs", &self.organization, &"teams", &team.slug])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn add_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError> {
        let url = self.membership_url(team, user)?;
        let request = self
            .rest
            .request(Method::PUT, url)
            .json(&json!({ "role": "member" }));
        self.rest.send_empty(request).await
    }

    async fn remove_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError> {
        let url = self.membership_url(team, user)?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn find_repository(&self, name: &str) -> Result<Option<Repository>, SourceHostError> {
        let url = self.rest.url(&[&"repos", &self.organization, &name])?;
        let found: Option<RepositoryDto> = self.get_optional(url).await?;
        Ok(found.map(Repository::from))
    }

    async fn repository_by_id(&self, id: RepositoryId) -> Result<Option<Repository>, SourceHostError> {
        let url = self.rest.url(&[&"repositories", &id])?;
        let found: Option<RepositoryDto> = self.get_optional(url).await?;
        Ok(found.map(Repository::from))
    }

    #[instrument(skip(self))]
    async fn create_repository(&self, name: &str) -> Result<Repository, SourceHostError> {
        let url = self.rest.url(&[&"orgs", &self.organization, &"repos"])?;
        let body = json!({ "name": name, "private": false });
        let repository: RepositoryDto = self.rest.send_json(Method::POST, url, &body).await?;
        info!(repository = %repository.name, "repository created");
        Ok(repository.into())
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<(), SourceHostError> {
        let url = self
            .rest
            .url(&[&"repos", &self.organization, &repository.name])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn grant_team_repository(
        &self,
        team: &ExternalTeam,
        repository: &Repository,
    ) -> Result<(), SourceHostError> {
        let url = self.rest.url(&[
            &"orgs",
            &self.organization,
            &"teams",
            &team.slug,
            &"repos",
            &self.organization,
            &repository.name,
        ])?;
        let request = self
            .rest
            .request(Method::PUT, url)
            .json(&json!({ "permission": TEAM_PERMISSION }));
        self.rest.send_empty(request).await
    }

    async fn contribution_weeks(
        &self,
        repository: &Repository,
    ) -> Result<Vec<ContributionWeek>, SourceHostError> {
        let url = self.rest.url(&[
            &"repos",
            &self.organization,
            &repository.name,
            &"stats",
            &"contributors",
        ])?;
        let response = self.rest.execute(self.rest.request(Method::GET, url)).await?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(Vec::new()),
            _ => decode::<Vec<ContributorDto>>(response)
                .await
                .map(flatten_contributors)
                .map_err(|e| api(format!("contributor statistics for {}: {e}", repository.name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_links_point_at_the_organization() {
        let host = GitHubHost::new("t", "ideaforge").unwrap();
        let team = ExternalTeam {
            id: ExternalTeamId::new(1),
            name: "idea-board".into(),
            slug: "idea-board".into(),
        };
        let repository = Repository {
            id: RepositoryId::new(2),
            name: "idea-board".into(),
        };
        assert_eq!(
            host.team_url(&team),
            "https://github.com/orgs/ideaforge/teams/idea-board"
        );
        assert_eq!(
            host.repository_url(&repository),
            "https://github.com/ideaforge/idea-board"
        );
        assert_eq!(host.organization(), "ideaforge");
    }

    #[test]
    fn contributor_statistics_flatten_into_weeks() {
        let json = r#"[
            {"author": {"id": 11, "login": "a"}, "total": 3, "weeks": [
                {"w": 1704067200, "a": 10, "d": 2, "c": 3},
                {"w": 1704672000, "a": 0, "d": 0, "c": 0}
            ]},
            {"author": null, "total": 1, "weeks": [{"w": 1704067200, "a": 1, "d": 0, "c": 1}]}
        ]"#;
        let contributors: Vec<ContributorDto> = serde_json::from_str(json).unwrap();
        let weeks = flatten_contributors(contributors);
        assert_eq!(weeks.len(), 2);
        assert!(weeks.iter().all(|w| w.author == ExternalUserId::new(11)));
        assert_eq!(weeks[0].commits, 3);
        assert_eq!(weeks[0].week_start, Timestamp::from_unix_seconds(1_704_067_200).unwrap());
    }

    #[test]
    fn users_keep_their_display_name() {
        let dto: UserDto =
            serde_json::from_str(r#"{"id": 5, "login": "octocat", "name": null}"#).unwrap();
        let user = ExternalUser::from(dto);
        assert_eq!(user.id, ExternalUserId::new(5));
        assert_eq!(user.login, "octocat");
        assert!(user.name.is_none());
    }
}
