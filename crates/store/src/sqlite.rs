//! SQLite-backed store.
//!
//! Four tables mirror the four store traits. Platform ids are stored as
//! `INTEGER` (`i64`); snowflakes and source-host ids fit comfortably.

use std::str::FromStr;

use async_trait::async_trait;
use community::{
    CategoryId, ChannelId, ConfigStore, ExternalTeamId, ExternalUserId, ExternalUsername, MemberId,
    RepositoryId, RoleId, Slug, StoreError, Team, TeamStore, UserMembership, UserStore, WarnStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS config (
        name  TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS teams (
        slug              TEXT PRIMARY KEY,
        role_id           INTEGER NOT NULL,
        leader_role_id    INTEGER NOT NULL,
        category_id       INTEGER NOT NULL,
        channel_id        INTEGER NOT NULL,
        external_team_id  INTEGER NOT NULL,
        repository_id     INTEGER NOT NULL,
        voting_channel_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS users (
        member_id         INTEGER NOT NULL,
        team_slug         TEXT NOT NULL,
        external_username TEXT NOT NULL,
        external_user_id  INTEGER NOT NULL,
        PRIMARY KEY (member_id, team_slug)
    )",
    "CREATE TABLE IF NOT EXISTS warns (
        member_id INTEGER PRIMARY KEY,
        count     INTEGER NOT NULL
    )",
];

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend {
        message: err.to_string(),
    }
}

fn corrupt(table: &'static str, message: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        table,
        message: message.to_string(),
    }
}

fn to_sql(id: u64) -> i64 {
    id as i64
}

fn column(row: &SqliteRow, table: &'static str, name: &str) -> Result<u64, StoreError> {
    row.try_get::<i64, _>(name)
        .map(|v| v as u64)
        .map_err(|e| corrupt(table, e))
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating when missing) the database at `url` and applies the
    /// schema. `sqlite::memory:` gives a private in-memory database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true);
        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.apply_schema().await?;
        info!(url, "sqlite store ready");
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    fn team_from_row(row: &SqliteRow) -> Result<Team, StoreError> {
        let slug: String = row.try_get("slug").map_err(|e| corrupt("teams", e))?;
        let voting: Option<i64> = row
            .try_get("voting_channel_id")
            .map_err(|e| corrupt("teams", e))?;
        Ok(Team {
            slug: Slug::parse(&slug).map_err(|e| corrupt("teams", e))?,
            role_id: RoleId::new(column(row, "teams", "role_id")?),
            leader_role_id: RoleId::new(column(row, "teams", "leader_role_id")?),
            category_id: CategoryId::new(column(row, "teams", "category_id")?),
            channel_id: ChannelId::new(column(row, "teams", "channel_id")?),
            external_team_id: ExternalTeamId::new(column(row, "teams", "external_team_id")?),
            repository_id: RepositoryId::new(column(row, "teams", "repository_id")?),
            voting_channel_id: voting.map(|v| ChannelId::new(v as u64)),
        })
    }

    fn membership_from_row(row: &SqliteRow) -> Result<UserMembership, StoreError> {
        let slug: String = row.try_get("team_slug").map_err(|e| corrupt("users", e))?;
        let username: String = row
            .try_get("external_username")
            .map_err(|e| corrupt("users", e))?;
        Ok(UserMembership {
            member_id: MemberId::new(column(row, "users", "member_id")?),
            team_slug: Slug::parse(&slug).map_err(|e| corrupt("users", e))?,
            external_username: ExternalUsername::new(username)
                .ok_or_else(|| corrupt("users", "blank external username"))?,
            external_user_id: ExternalUserId::new(column(row, "users", "external_user_id")?),
        })
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM config WHERE name = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| r.try_get::<String, _>("value").map_err(|e| corrupt("config", e)))
            .transpose()
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO config (name, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        debug!(key, "setting stored");
        Ok(())
    }

    async fn settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT name, value FROM config ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|r| {
                Ok((
                    r.try_get::<String, _>("name").map_err(|e| corrupt("config", e))?,
                    r.try_get::<String, _>("value").map_err(|e| corrupt("config", e))?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl TeamStore for SqliteStore {
    async fn team(&self, slug: &Slug) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT * FROM teams WHERE slug = ?")
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::team_from_row).transpose()
    }

    async fn team_by_external_id(&self, id: ExternalTeamId) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT * FROM teams WHERE external_team_id = ?")
            .bind(to_sql(id.as_u64()))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::team_from_row).transpose()
    }

    async fn save_team(&self, team: &Team) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO teams (slug, role_id, leader_role_id, category_id, channel_id, \
             external_team_id, repository_id, voting_channel_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(team.slug.as_str())
        .bind(to_sql(team.role_id.as_u64()))
        .bind(to_sql(team.leader_role_id.as_u64()))
        .bind(to_sql(team.category_id.as_u64()))
        .bind(to_sql(team.channel_id.as_u64()))
        .bind(to_sql(team.external_team_id.as_u64()))
        .bind(to_sql(team.repository_id.as_u64()))
        .bind(team.voting_channel_id.map(|c| to_sql(c.as_u64())))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn set_voting_channel(
        &self,
        slug: &Slug,
        channel: Option<ChannelId>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE teams SET voting_channel_id = ? WHERE slug = ?")
            .bind(channel.map(|c| to_sql(c.as_u64())))
            .bind(slug.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_team(&self, slug: &Slug) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM teams WHERE slug = ?")
            .bind(slug.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn membership(
        &self,
        member: MemberId,
        slug: &Slug,
    ) -> Result<Option<UserMembership>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE member_id = ? AND team_slug = ?")
            .bind(to_sql(member.as_u64()))
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::membership_from_row).transpose()
    }

    async fn save_membership(&self, membership: &UserMembership) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO users (member_id, team_slug, external_username, external_user_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(to_sql(membership.member_id.as_u64()))
        .bind(membership.team_slug.as_str())
        .bind(membership.external_username.as_str())
        .bind(to_sql(membership.external_user_id.as_u64()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn memberships_for_team(&self, slug: &Slug) -> Result<Vec<UserMembership>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users WHERE team_slug = ? ORDER BY member_id")
            .bind(slug.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(Self::membership_from_row).collect()
    }

    async fn all_memberships(&self) -> Result<Vec<UserMembership>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY team_slug, member_id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(Self::membership_from_row).collect()
    }

    async fn delete_memberships_for_team(&self, slug: &Slug) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE team_slug = ?")
            .bind(slug.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl WarnStore for SqliteStore {
    async fn add_warning(&self, member: MemberId) -> Result<u32, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO warns (member_id, count) VALUES (?, 1) \
             ON CONFLICT(member_id) DO UPDATE SET count = count + 1",
        )
        .bind(to_sql(member.as_u64()))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        let row = sqlx::query("SELECT count FROM warns WHERE member_id = ?")
            .bind(to_sql(member.as_u64()))
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(column(&row, "warns", "count")? as u32)
    }

    async fn warnings(&self, member: MemberId) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT count FROM warns WHERE member_id = ?")
            .bind(to_sql(member.as_u64()))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => Ok(column(&row, "warns", "count")? as u32),
            None => Ok(0),
        }
    }

    async fn clear_warnings(&self, member: MemberId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM warns WHERE member_id = ?")
            .bind(to_sql(member.as_u64()))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
