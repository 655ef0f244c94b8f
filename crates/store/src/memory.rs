//! In-process store.
//!
//! Holds every table in a single mutex. Used for dry runs (`--memory-store`)
//! and as the persistence double in workflow tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use community::{
    ChannelId, ConfigStore, ExternalTeamId, MemberId, Slug, StoreError, Team, TeamStore,
    UserMembership, UserStore, WarnStore,
};

#[derive(Debug, Default)]
struct Tables {
    config: BTreeMap<String, String>,
    teams: HashMap<Slug, Team>,
    users: BTreeMap<(MemberId, Slug), UserMembership>,
    warns: HashMap<MemberId, u32>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables().config.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tables()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .tables()
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn team(&self, slug: &Slug) -> Result<Option<Team>, StoreError> {
        Ok(self.tables().teams.get(slug).cloned())
    }

    async fn team_by_external_id(&self, id: ExternalTeamId) -> Result<Option<Team>, StoreError> {
        Ok(self
            .tables()
            .teams
            .values()
            .find(|t| t.external_team_id == id)
            .cloned())
    }

    async fn save_team(&self, team: &Team) -> Result<(), StoreError> {
        self.tables().teams.insert(team.slug.clone(), team.clone());
        Ok(())
    }

    async fn set_voting_channel(
        &self,
        slug: &Slug,
        channel: Option<ChannelId>,
    ) -> Result<(), StoreError> {
        if let Some(team) = self.tables().teams.get_mut(slug) {
            team.voting_channel_id = channel;
        }
        Ok(())
    }

    async fn delete_team(&self, slug: &Slug) -> Result<(), StoreError> {
        self.tables().teams.remove(slug);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn membership(
        &self,
        member: MemberId,
        slug: &Slug,
    ) -> Result<Option<UserMembership>, StoreError> {
        Ok(self.tables().users.get(&(member, slug.clone())).cloned())
    }

    async fn save_membership(&self, membership: &UserMembership) -> Result<(), StoreError> {
        self.tables().users.insert(
            (membership.member_id, membership.team_slug.clone()),
            membership.clone(),
        );
        Ok(())
    }

    async fn memberships_for_team(&self, slug: &Slug) -> Result<Vec<UserMembership>, StoreError> {
        Ok(self
            .tables()
            .users
            .values()
            .filter(|m| &m.team_slug == slug)
            .cloned()
            .collect())
    }

    async fn all_memberships(&self) -> Result<Vec<UserMembership>, StoreError> {
        Ok(self.tables().users.values().cloned().collect())
    }

    async fn delete_memberships_for_team(&self, slug: &Slug) -> Result<(), StoreError> {
        self.tables().users.retain(|(_, s), _| s != slug);
        Ok(())
    }
}

#[async_trait]
impl WarnStore for MemoryStore {
    async fn add_warning(&self, member: MemberId) -> Result<u32, StoreError> {
        let mut tables = self.tables();
        let count = tables.warns.entry(member).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn warnings(&self, member: MemberId) -> Result<u32, StoreError> {
        Ok(self.tables().warns.get(&member).copied().unwrap_or(0))
    }

    async fn clear_warnings(&self, member: MemberId) -> Result<(), StoreError> {
        self.tables().warns.remove(&member);
        Ok(())
    }
}
