//! In-memory doubles for the chat platform and the source host.
//!
//! Both fakes record every mutating call as a short string (`"create_role:idea-board"`)
//! so tests can assert how often something was created.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use community::{
    Category, CategoryId, Channel, ChannelId, ChannelKind, ChannelSpec, ChatError, ChatPlatform,
    ContributionWeek, Embed, ExternalTeam, ExternalTeamId, ExternalUser, ExternalUserId, GuildId,
    Member, MemberId, Message, MessageId, OutgoingMessage, Repository, RepositoryId, Role, RoleId,
    RoleSpec, SettingKey, SourceHost, SourceHostError, Timestamp, UserRef,
};
use store::MemoryStore;

use crate::Services;

pub const BOT_ID: MemberId = MemberId::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Member ids mentioned as `<@id>` or `<@!id>` in `content`, in order.
fn parse_mentions(content: &str) -> Vec<MemberId> {
    let mut ids = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("<@") {
        rest = &rest[start + 2..];
        if rest.starts_with('&') {
            continue;
        }
        let body = rest.trim_start_matches('!');
        if let Some(end) = body.find('>') {
            if let Ok(id) = body[..end].parse::<u64>() {
                let id = MemberId::new(id);
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// FakeChat
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChatState {
    next_id: u64,
    members: BTreeMap<MemberId, Member>,
    roles: BTreeMap<RoleId, Role>,
    role_colours: HashMap<RoleId, Option<u32>>,
    hoisted: HashSet<RoleId>,
    categories: BTreeMap<CategoryId, Category>,
    channels: BTreeMap<ChannelId, Channel>,
    messages: BTreeMap<ChannelId, Vec<Message>>,
    reactions: HashMap<(MessageId, String), Vec<UserRef>>,
    dm_channels: HashMap<MemberId, ChannelId>,
    closed_dms: HashSet<MemberId>,
    unkickable: HashSet<MemberId>,
    kicked: Vec<MemberId>,
    calls: Vec<String>,
}

impl ChatState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: MemberId) -> UserRef {
        UserRef {
            id,
            bot: self.members.get(&id).map(|m| m.bot).unwrap_or(false),
        }
    }

    fn post(&mut self, channel: ChannelId, author: MemberId, message: OutgoingMessage) -> Message {
        let id = MessageId::new(self.next());
        let mentions = parse_mentions(&message.content)
            .into_iter()
            .map(|m| self.user(m))
            .collect();
        let posted = Message {
            id,
            channel_id: channel,
            author: self.user(author),
            content: message.content,
            mentions,
            embeds: message.embed.into_iter().collect(),
            reactions: Vec::new(),
            created_at: Timestamp::now(),
            edited_at: None,
        };
        self.messages.entry(channel).or_default().push(posted.clone());
        posted
    }

    fn message_mut(&mut self, channel: ChannelId, id: MessageId) -> Option<&mut Message> {
        self.messages
            .get_mut(&channel)
            .and_then(|list| list.iter_mut().find(|m| m.id == id))
    }
}

/// An in-memory guild with the bot as member `1`.
pub struct FakeChat {
    guild: GuildId,
    state: Mutex<ChatState>,
}

impl Default for FakeChat {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChat {
    pub fn new() -> Self {
        let chat = Self {
            guild: GuildId::new(900),
            state: Mutex::new(ChatState {
                next_id: 1_000,
                ..ChatState::default()
            }),
        };
        chat.add_member_with(BOT_ID, true, false);
        chat
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn add_member(&self, id: u64) -> MemberId {
        let id = MemberId::new(id);
        self.add_member_with(id, false, false);
        id
    }

    pub fn add_admin(&self, id: u64) -> MemberId {
        let id = MemberId::new(id);
        self.add_member_with(id, false, true);
        id
    }

    pub fn add_member_with(&self, id: MemberId, bot: bool, administrator: bool) {
        lock(&self.state).members.insert(
            id,
            Member {
                id,
                bot,
                roles: Vec::new(),
                administrator,
            },
        );
    }

    pub fn remove_member(&self, id: MemberId) {
        lock(&self.state).members.remove(&id);
    }

    pub fn add_text_channel(&self, name: &str) -> ChannelId {
        let mut state = lock(&self.state);
        let id = ChannelId::new(state.next());
        state.channels.insert(
            id,
            Channel {
                id,
                name: name.to_string(),
                kind: ChannelKind::Text,
                category: None,
            },
        );
        id
    }

    /// Registers a channel under a fixed id.
    pub fn add_channel_with_id(&self, id: ChannelId, name: &str) {
        lock(&self.state).channels.insert(
            id,
            Channel {
                id,
                name: name.to_string(),
                kind: ChannelKind::Text,
                category: None,
            },
        );
    }

    pub fn add_role(&self, name: &str) -> RoleId {
        let mut state = lock(&self.state);
        let id = RoleId::new(state.next());
        state.roles.insert(
            id,
            Role {
                id,
                name: name.to_string(),
                administrator: false,
            },
        );
        id
    }

    /// Gives `role` the administrator permission.
    pub fn make_admin_role(&self, role: RoleId) {
        if let Some(r) = lock(&self.state).roles.get_mut(&role) {
            r.administrator = true;
        }
    }

    pub fn grant(&self, member: MemberId, role: RoleId) {
        if let Some(m) = lock(&self.state).members.get_mut(&member) {
            if !m.roles.contains(&role) {
                m.roles.push(role);
            }
        }
    }

    pub fn close_dms(&self, member: MemberId) {
        lock(&self.state).closed_dms.insert(member);
    }

    /// Makes kicking `member` fail as if they ranked above the bot.
    pub fn outrank_bot(&self, member: MemberId) {
        lock(&self.state).unkickable.insert(member);
    }

    pub fn post_as_bot(&self, channel: ChannelId, message: OutgoingMessage) -> Message {
        lock(&self.state).post(channel, BOT_ID, message)
    }

    pub fn post_as(&self, channel: ChannelId, author: MemberId, message: OutgoingMessage) -> Message {
        lock(&self.state).post(channel, author, message)
    }

    pub fn react(&self, message: MessageId, emoji: &str, member: MemberId) {
        let mut state = lock(&self.state);
        let user = state.user(member);
        let users = state.reactions.entry((message, emoji.to_string())).or_default();
        if !users.iter().any(|u| u.id == member) {
            users.push(user);
        }
    }

    pub fn reactors(&self, message: MessageId, emoji: &str) -> Vec<MemberId> {
        lock(&self.state)
            .reactions
            .get(&(message, emoji.to_string()))
            .map(|users| users.iter().map(|u| u.id).collect())
            .unwrap_or_default()
    }

    /// Messages in `channel`, oldest first.
    pub fn messages(&self, channel: ChannelId) -> Vec<Message> {
        lock(&self.state)
            .messages
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dm_channel(&self, member: MemberId) -> Option<ChannelId> {
        lock(&self.state).dm_channels.get(&member).copied()
    }

    /// Direct messages sent to `member`, oldest first.
    pub fn direct_messages(&self, member: MemberId) -> Vec<Message> {
        self.dm_channel(member)
            .map(|c| self.messages(c))
            .unwrap_or_default()
    }

    pub fn find_role_id(&self, name: &str) -> Option<RoleId> {
        lock(&self.state)
            .roles
            .values()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn holders(&self, role: RoleId) -> Vec<MemberId> {
        lock(&self.state)
            .members
            .values()
            .filter(|m| m.has_role(role))
            .map(|m| m.id)
            .collect()
    }

    pub fn role_colour(&self, role: RoleId) -> Option<u32> {
        lock(&self.state).role_colours.get(&role).copied().flatten()
    }

    pub fn is_hoisted(&self, role: RoleId) -> bool {
        lock(&self.state).hoisted.contains(&role)
    }

    pub fn kicked(&self) -> Vec<MemberId> {
        lock(&self.state).kicked.clone()
    }

    pub fn channel_named(&self, name: &str) -> Vec<Channel> {
        lock(&self.state)
            .channels
            .values()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        lock(&self.state).calls.push(call);
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<Message, ChatError> {
        let mut state = lock(&self.state);
        let reactions = state.reactions.clone();
        let found = state
            .message_mut(channel, message)
            .ok_or_else(|| ChatError::not_found(format!("message {message}")))?;
        found.reactions = reactions
            .iter()
            .filter(|((id, _), _)| *id == message)
            .map(|((_, emoji), users)| community::ReactionSummary {
                emoji: emoji.clone(),
                count: users.len() as u32,
            })
            .collect();
        Ok(found.clone())
    }

    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError> {
        let mut history = self.messages(channel);
        history.reverse();
        Ok(history)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let mut state = lock(&self.state);
        let known = state.channels.contains_key(&channel)
            || state.dm_channels.values().any(|c| *c == channel);
        if !known {
            return Err(ChatError::not_found(format!("channel {channel}")));
        }
        Ok(state.post(channel, BOT_ID, message))
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: Embed,
    ) -> Result<Message, ChatError> {
        let mut state = lock(&self.state);
        let found = state
            .message_mut(channel, message)
            .ok_or_else(|| ChatError::not_found(format!("message {message}")))?;
        found.embeds = vec![embed];
        found.edited_at = Some(Timestamp::now());
        Ok(found.clone())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        let list = state.messages.entry(channel).or_default();
        let before = list.len();
        list.retain(|m| m.id != message);
        if list.len() == before {
            return Err(ChatError::not_found(format!("message {message}")));
        }
        state.calls.push(format!("delete_message:{message}"));
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ChatError> {
        if lock(&self.state).message_mut(channel, message).is_none() {
            return Err(ChatError::not_found(format!("message {message}")));
        }
        self.react(message, emoji, BOT_ID);
        self.record(format!("add_reaction:{message}:{emoji}"));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        if let Some(users) = state.reactions.get_mut(&(message, emoji.to_string())) {
            users.retain(|u| u.id != member);
        }
        state
            .calls
            .push(format!("remove_reaction:{message}:{emoji}:{member}"));
        Ok(())
    }

    async fn reaction_users(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<UserRef>, ChatError> {
        Ok(lock(&self.state)
            .reactions
            .get(&(message, emoji.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn member(&self, member: MemberId) -> Result<Option<Member>, ChatError> {
        let state = lock(&self.state);
        Ok(state.members.get(&member).map(|m| {
            let mut m = m.clone();
            m.administrator |= m
                .roles
                .iter()
                .any(|r| state.roles.get(r).map(|r| r.administrator).unwrap_or(false));
            m
        }))
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError> {
        if !lock(&self.state).roles.contains_key(&role) {
            return Err(ChatError::not_found(format!("role {role}")));
        }
        if !lock(&self.state).members.contains_key(&member) {
            return Err(ChatError::not_found(format!("member {member}")));
        }
        self.grant(member, role);
        self.record(format!("add_role:{member}:{role}"));
        Ok(())
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        if let Some(m) = state.members.get_mut(&member) {
            m.roles.retain(|r| *r != role);
        }
        state.calls.push(format!("remove_role:{member}:{role}"));
        Ok(())
    }

    async fn kick(&self, member: MemberId, _reason: &str) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        if state.unkickable.contains(&member) {
            return Err(ChatError::Forbidden {
                reason: "Missing Permissions".into(),
            });
        }
        if state.members.remove(&member).is_none() {
            return Err(ChatError::not_found(format!("member {member}")));
        }
        state.kicked.push(member);
        Ok(())
    }

    async fn send_direct(
        &self,
        member: MemberId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let mut state = lock(&self.state);
        if state.closed_dms.contains(&member) {
            return Err(ChatError::Forbidden {
                reason: "cannot send messages to this user".into(),
            });
        }
        let channel = match state.dm_channels.get(&member) {
            Some(channel) => *channel,
            None => {
                let channel = ChannelId::new(state.next());
                state.dm_channels.insert(member, channel);
                channel
            }
        };
        Ok(state.post(channel, BOT_ID, message))
    }

    async fn role(&self, role: RoleId) -> Result<Option<Role>, ChatError> {
        Ok(lock(&self.state).roles.get(&role).cloned())
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>, ChatError> {
        Ok(lock(&self.state)
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn create_role(&self, spec: RoleSpec) -> Result<Role, ChatError> {
        let mut state = lock(&self.state);
        let id = RoleId::new(state.next());
        let role = Role {
            id,
            name: spec.name.clone(),
            administrator: false,
        };
        state.roles.insert(id, role.clone());
        state.role_colours.insert(id, spec.colour);
        if spec.hoist {
            state.hoisted.insert(id);
        }
        state.calls.push(format!("create_role:{}", spec.name));
        Ok(role)
    }

    async fn set_role_hoist(&self, role: RoleId, hoist: bool) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        if hoist {
            state.hoisted.insert(role);
        } else {
            state.hoisted.remove(&role);
        }
        Ok(())
    }

    async fn delete_role(&self, role: RoleId) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        let removed = state
            .roles
            .remove(&role)
            .ok_or_else(|| ChatError::not_found(format!("role {role}")))?;
        for member in state.members.values_mut() {
            member.roles.retain(|r| *r != role);
        }
        state.calls.push(format!("delete_role:{}", removed.name));
        Ok(())
    }

    async fn role_members(&self, role: RoleId) -> Result<Vec<Member>, ChatError> {
        Ok(lock(&self.state)
            .members
            .values()
            .filter(|m| m.has_role(role))
            .cloned()
            .collect())
    }

    async fn category(&self, category: CategoryId) -> Result<Option<Category>, ChatError> {
        Ok(lock(&self.state).categories.get(&category).cloned())
    }

    async fn find_category(&self, name: &str) -> Result<Option<Category>, ChatError> {
        Ok(lock(&self.state)
            .categories
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn create_category(
        &self,
        name: &str,
        _visible_to: Option<RoleId>,
    ) -> Result<Category, ChatError> {
        let mut state = lock(&self.state);
        let id = CategoryId::new(state.next());
        let category = Category {
            id,
            name: name.to_string(),
        };
        state.categories.insert(id, category.clone());
        state.calls.push(format!("create_category:{name}"));
        Ok(category)
    }

    async fn delete_category(&self, category: CategoryId) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        state
            .categories
            .remove(&category)
            .ok_or_else(|| ChatError::not_found(format!("category {category}")))?;
        state.calls.push(format!("delete_category:{category}"));
        Ok(())
    }

    async fn category_channels(&self, category: CategoryId) -> Result<Vec<Channel>, ChatError> {
        Ok(lock(&self.state)
            .channels
            .values()
            .filter(|c| c.category == Some(category))
            .cloned()
            .collect())
    }

    async fn channel(&self, channel: ChannelId) -> Result<Option<Channel>, ChatError> {
        Ok(lock(&self.state).channels.get(&channel).cloned())
    }

    async fn create_channel(&self, spec: ChannelSpec) -> Result<Channel, ChatError> {
        let mut state = lock(&self.state);
        let id = ChannelId::new(state.next());
        let channel = Channel {
            id,
            name: spec.name.clone(),
            kind: spec.kind,
            category: spec.category,
        };
        state.channels.insert(id, channel.clone());
        state.calls.push(format!("create_channel:{}", spec.name));
        Ok(channel)
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError> {
        let mut state = lock(&self.state);
        state
            .channels
            .remove(&channel)
            .ok_or_else(|| ChatError::not_found(format!("channel {channel}")))?;
        state.messages.remove(&channel);
        state.calls.push(format!("delete_channel:{channel}"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeSourceHost
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SourceState {
    next_id: u64,
    users: Vec<ExternalUser>,
    teams: Vec<ExternalTeam>,
    team_members: HashMap<ExternalTeamId, Vec<ExternalUserId>>,
    repositories: Vec<Repository>,
    grants: Vec<(ExternalTeamId, RepositoryId)>,
    contributions: HashMap<RepositoryId, Vec<ContributionWeek>>,
    calls: Vec<String>,
}

pub struct FakeSourceHost {
    state: Mutex<SourceState>,
}

impl Default for FakeSourceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSourceHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState {
                next_id: 5_000,
                ..SourceState::default()
            }),
        }
    }

    pub fn add_user(&self, login: &str) -> ExternalUser {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let user = ExternalUser {
            id: ExternalUserId::new(state.next_id),
            login: login.to_string(),
            name: None,
        };
        state.users.push(user.clone());
        user
    }

    pub fn remove_user(&self, login: &str) {
        lock(&self.state).users.retain(|u| u.login != login);
    }

    pub fn add_contribution(&self, repository: RepositoryId, week: ContributionWeek) {
        lock(&self.state)
            .contributions
            .entry(repository)
            .or_default()
            .push(week);
    }

    pub fn team_member_ids(&self, team: &str) -> Vec<ExternalUserId> {
        let state = lock(&self.state);
        state
            .teams
            .iter()
            .find(|t| t.name == team)
            .and_then(|t| state.team_members.get(&t.id).cloned())
            .unwrap_or_default()
    }

    pub fn team_names(&self) -> Vec<String> {
        lock(&self.state).teams.iter().map(|t| t.name.clone()).collect()
    }

    pub fn grants(&self) -> Vec<(ExternalTeamId, RepositoryId)> {
        lock(&self.state).grants.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    fn organization(&self) -> &str {
        "ideaforge"
    }

    fn team_url(&self, team: &ExternalTeam) -> String {
        format!("https://source.test/orgs/ideaforge/teams/{}", team.slug)
    }

    fn repository_url(&self, repository: &Repository) -> String {
        format!("https://source.test/ideaforge/{}", repository.name)
    }

    async fn user_by_id(&self, id: ExternalUserId) -> Result<ExternalUser, SourceHostError> {
        lock(&self.state)
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| SourceHostError::NotFound {
                what: format!("user {id}"),
            })
    }

    async fn user_by_login(&self, login: &str) -> Result<ExternalUser, SourceHostError> {
        lock(&self.state)
            .users
            .iter()
            .find(|u| u.login.eq_ignore_ascii_case(login))
            .cloned()
            .ok_or_else(|| SourceHostError::UnknownUser {
                login: login.to_string(),
            })
    }

    async fn find_team(&self, name: &str) -> Result<Option<ExternalTeam>, SourceHostError> {
        Ok(lock(&self.state)
            .teams
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn team_by_id(&self, id: ExternalTeamId) -> Result<Option<ExternalTeam>, SourceHostError> {
        Ok(lock(&self.state).teams.iter().find(|t| t.id == id).cloned())
    }

    async fn teams(&self) -> Result<Vec<ExternalTeam>, SourceHostError> {
        Ok(lock(&self.state).teams.clone())
    }

    async fn create_team(&self, name: &str) -> Result<ExternalTeam, SourceHostError> {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let team = ExternalTeam {
            id: ExternalTeamId::new(state.next_id),
            name: name.to_string(),
            slug: name.to_string(),
        };
        state.teams.push(team.clone());
        state.calls.push(format!("create_team:{name}"));
        Ok(team)
    }

    async fn delete_team(&self, team: &ExternalTeam) -> Result<(), SourceHostError> {
        let mut state = lock(&self.state);
        state.teams.retain(|t| t.id != team.id);
        state.calls.push(format!("delete_team:{}", team.name));
        Ok(())
    }

    async fn add_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError> {
        let mut state = lock(&self.state);
        let members = state.team_members.entry(team.id).or_default();
        if !members.contains(&user.id) {
            members.push(user.id);
        }
        state.calls.push(format!("add_team_member:{}:{}", team.name, user.login));
        Ok(())
    }

    async fn remove_team_member(
        &self,
        team: &ExternalTeam,
        user: &ExternalUser,
    ) -> Result<(), SourceHostError> {
        let mut state = lock(&self.state);
        if let Some(members) = state.team_members.get_mut(&team.id) {
            members.retain(|m| *m != user.id);
        }
        state
            .calls
            .push(format!("remove_team_member:{}:{}", team.name, user.login));
        Ok(())
    }

    async fn find_repository(&self, name: &str) -> Result<Option<Repository>, SourceHostError> {
        Ok(lock(&self.state)
            .repositories
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn repository_by_id(
        &self,
        id: RepositoryId,
    ) -> Result<Option<Repository>, SourceHostError> {
        Ok(lock(&self.state)
            .repositories
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn create_repository(&self, name: &str) -> Result<Repository, SourceHostError> {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let repository = Repository {
            id: RepositoryId::new(state.next_id),
            name: name.to_string(),
        };
        state.repositories.push(repository.clone());
        state.calls.push(format!("create_repository:{name}"));
        Ok(repository)
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<(), SourceHostError> {
        let mut state = lock(&self.state);
        state.repositories.retain(|r| r.id != repository.id);
        state.calls.push(format!("delete_repository:{}", repository.name));
        Ok(())
    }

    async fn grant_team_repository(
        &self,
        team: &ExternalTeam,
        repository: &Repository,
    ) -> Result<(), SourceHostError> {
        let mut state = lock(&self.state);
        let grant = (team.id, repository.id);
        if !state.grants.contains(&grant) {
            state.grants.push(grant);
        }
        Ok(())
    }

    async fn contribution_weeks(
        &self,
        repository: &Repository,
    ) -> Result<Vec<ContributionWeek>, SourceHostError> {
        Ok(lock(&self.state)
            .contributions
            .get(&repository.id)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const VOTING_WINDOW_SECS: u64 = 3_600;
pub const GATHERING_WINDOW_SECS: u64 = 7_200;
pub const REQUIRED_VOTES: usize = 5;

/// The configured channels of a [`Harness`].
pub struct Channels {
    pub idea: ChannelId,
    pub overview: ChannelId,
    pub messages: ChannelId,
    pub running: ChannelId,
    pub bot: ChannelId,
    pub finished: ChannelId,
}

pub struct Harness {
    pub chat: Arc<FakeChat>,
    pub source: Arc<FakeSourceHost>,
    pub store: Arc<MemoryStore>,
    pub services: Services,
    pub channels: Channels,
}

impl Harness {
    pub async fn new() -> Self {
        let chat = Arc::new(FakeChat::new());
        let source = Arc::new(FakeSourceHost::new());
        let store = Arc::new(MemoryStore::new());

        let channels = Channels {
            idea: chat.add_text_channel("ideas"),
            overview: chat.add_text_channel("overview"),
            messages: chat.add_text_channel("failed-messages"),
            running: chat.add_text_channel("running"),
            bot: chat.add_text_channel("bot-log"),
            finished: chat.add_text_channel("finished"),
        };
        let values = [
            (SettingKey::IdeaChannel, channels.idea.to_string()),
            (SettingKey::OverviewChannel, channels.overview.to_string()),
            (SettingKey::MessagesChannel, channels.messages.to_string()),
            (SettingKey::RunningChannel, channels.running.to_string()),
            (SettingKey::BotChannel, channels.bot.to_string()),
            (SettingKey::FinishedChannel, channels.finished.to_string()),
            (SettingKey::TimeToWait, VOTING_WINDOW_SECS.to_string()),
            (SettingKey::GithubSleepTime, GATHERING_WINDOW_SECS.to_string()),
            (SettingKey::RequiredVotes, REQUIRED_VOTES.to_string()),
        ];
        for (key, value) in values {
            community::ConfigStore::set_setting(&*store, key.as_str(), &value)
                .await
                .unwrap();
        }

        let services = Services::new(
            chat.clone(),
            source.clone(),
            store.clone(),
            chat.guild(),
            Timestamp::now(),
        );
        Self {
            chat,
            source,
            store,
            services,
            channels,
        }
    }

    /// Adds guild members `first..first + count`.
    pub fn members(&self, first: u64, count: u64) -> Vec<MemberId> {
        (first..first + count).map(|id| self.chat.add_member(id)).collect()
    }
}
