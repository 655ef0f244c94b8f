//! [`ChatPlatform`] over Discord REST.

use async_trait::async_trait;
use community::{
    Category, CategoryId, Channel, ChannelId, ChannelKind, ChannelSpec, ChatError, ChatPlatform,
    Embed, GuildId, Member, MemberId, Message, MessageId, OutgoingMessage, Role, RoleId, RoleSpec,
    UserRef,
};
use reqwest::Method;
use tracing::{debug, instrument};

use crate::client::{RestClient, DEFAULT_API_BASE};
use crate::wire::{
    parse_id, ChannelDto, CreateChannel, CreateDm, CreateMessage, CreateRole, DmChannelDto,
    EditEmbeds, EmbedDto, GuildMemberDto, MessageDto, PermissionOverwrite, RoleDto, UserDto,
    CATEGORY_CHANNEL, TEXT_CHANNEL, VOICE_CHANNEL,
};

/// Messages fetched per history request; Discord's maximum.
const PAGE_LIMIT: &str = "100";

/// Users fetched per page when listing reactors; Discord's maximum.
const REACTION_PAGE: usize = 100;

/// Members fetched per page when listing role holders.
const MEMBER_PAGE: usize = 1000;

/// Chat adapter bound to one guild.
pub struct DiscordChat {
    rest: RestClient,
    guild: GuildId,
}

impl DiscordChat {
    pub fn new(token: impl Into<String>, guild: GuildId) -> Result<Self, ChatError> {
        Self::with_base_url(DEFAULT_API_BASE, token, guild)
    }

    /// Points the adapter at another API root (a proxy or a test server).
    pub fn with_base_url(
        base: &str,
        token: impl Into<String>,
        guild: GuildId,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            rest: RestClient::new(base, token.into())?,
            guild,
        })
    }

    /// The `@everyone` role shares the guild's id.
    fn everyone(&self) -> RoleId {
        RoleId::new(self.guild.as_u64())
    }

    async fn guild_roles(&self) -> Result<Vec<RoleDto>, ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"roles"])?;
        self.rest.get(url).await
    }

    async fn guild_channels(&self) -> Result<Vec<ChannelDto>, ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"channels"])?;
        self.rest.get(url).await
    }

    async fn channel_dto(&self, channel: u64) -> Result<Option<ChannelDto>, ChatError> {
        let url = self.rest.url(&[&"channels", &channel])?;
        missing_as_none(self.rest.get(url).await)
    }

    fn to_member(dto: &GuildMemberDto, roles: &[RoleDto]) -> Result<Member, ChatError> {
        let held = dto
            .roles
            .iter()
            .map(|r| parse_id::<RoleId>(r))
            .collect::<Result<Vec<_>, _>>()?;
        let administrator = roles
            .iter()
            .filter(|role| dto.roles.contains(&role.id))
            .any(RoleDto::is_administrator);
        Ok(Member {
            id: parse_id(&dto.user.id)?,
            bot: dto.user.bot,
            roles: held,
            administrator,
        })
    }

    async fn create_guild_channel(&self, body: CreateChannel) -> Result<ChannelDto, ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"channels"])?;
        self.rest.send_json(Method::POST, url, &body).await
    }

    async fn delete_guild_channel(&self, channel: u64) -> Result<(), ChatError> {
        let url = self.rest.url(&[&"channels", &channel])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    fn overwrites(&self, visible_to: Option<RoleId>) -> Vec<PermissionOverwrite> {
        visible_to
            .map(|role| PermissionOverwrite::private_to(self.everyone(), role))
            .unwrap_or_default()
    }
}

fn missing_as_none<T>(result: Result<T, ChatError>) -> Result<Option<T>, ChatError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn outgoing(message: OutgoingMessage) -> CreateMessage {
    CreateMessage {
        content: message.content,
        embeds: message.embed.map(EmbedDto::from).into_iter().collect(),
    }
}

#[async_trait]
impl ChatPlatform for DiscordChat {
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<Message, ChatError> {
        let url = self.rest.url(&[&"channels", &channel, &"messages", &message])?;
        self.rest.get::<MessageDto>(url).await?.into_message()
    }

    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError> {
        let mut url = self.rest.url(&[&"channels", &channel, &"messages"])?;
        url.query_pairs_mut().append_pair("limit", PAGE_LIMIT);
        let page: Vec<MessageDto> = self.rest.get(url).await?;
        page.into_iter().map(MessageDto::into_message).collect()
    }

    #[instrument(skip_all, fields(channel = %channel))]
    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let url = self.rest.url(&[&"channels", &channel, &"messages"])?;
        let sent: MessageDto = self
            .rest
            .send_json(Method::POST, url, &outgoing(message))
            .await?;
        sent.into_message()
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: Embed,
    ) -> Result<Message, ChatError> {
        let url = self.rest.url(&[&"channels", &channel, &"messages", &message])?;
        let body = EditEmbeds {
            embeds: vec![embed.into()],
        };
        let edited: MessageDto = self.rest.send_json(Method::PATCH, url, &body).await?;
        edited.into_message()
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ChatError> {
        let url = self.rest.url(&[&"channels", &channel, &"messages", &message])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let url = self.rest.url(&[
            &"channels",
            &channel,
            &"messages",
            &message,
            &"reactions",
            &emoji,
            &"@me",
        ])?;
        self.rest.send_empty(self.rest.request(Method::PUT, url)).await
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> Result<(), ChatError> {
        let url = self.rest.url(&[
            &"channels",
            &channel,
            &"messages",
            &message,
            &"reactions",
            &emoji,
            &member,
        ])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<UserRef>, ChatError> {
        let mut reactors = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut url = self.rest.url(&[
                &"channels",
                &channel,
                &"messages",
                &message,
                &"reactions",
                &emoji,
            ])?;
            url.query_pairs_mut()
                .append_pair("limit", &REACTION_PAGE.to_string());
            if let Some(after) = &after {
                url.query_pairs_mut().append_pair("after", after);
            }
            let page: Vec<UserDto> = self.rest.get(url).await?;
            for user in &page {
                reactors.push(user.to_ref()?);
            }
            match page.last() {
                Some(last) if page.len() == REACTION_PAGE => after = Some(last.id.clone()),
                _ => return Ok(reactors),
            }
        }
    }

    async fn member(&self, member: MemberId) -> Result<Option<Member>, ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"members", &member])?;
        let Some(dto) = missing_as_none(self.rest.get::<GuildMemberDto>(url).await)? else {
            return Ok(None);
        };
        let roles = self.guild_roles().await?;
        Self::to_member(&dto, &roles).map(Some)
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError> {
        let url = self.rest.url(&[
            &"guilds",
            &self.guild,
            &"members",
            &member,
            &"roles",
            &role,
        ])?;
        self.rest.send_empty(self.rest.request(Method::PUT, url)).await
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), ChatError> {
        let url = self.rest.url(&[
            &"guilds",
            &self.guild,
            &"members",
            &member,
            &"roles",
            &role,
        ])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    #[instrument(skip_all, fields(member = %member))]
    async fn kick(&self, member: MemberId, reason: &str) -> Result<(), ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"members", &member])?;
        let mut request = self.rest.request(Method::DELETE, url);
        if reason.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
            request = request.header("X-Audit-Log-Reason", reason);
        }
        self.rest.send_empty(request).await
    }

    async fn send_direct(
        &self,
        member: MemberId,
        message: OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let url = self.rest.url(&[&"users", &"@me", &"channels"])?;
        let body = CreateDm {
            recipient_id: member.to_string(),
        };
        let dm: DmChannelDto = self.rest.send_json(Method::POST, url, &body).await?;
        let channel: ChannelId = parse_id(&dm.id)?;
        debug!(member = %member, channel = %channel, "direct message channel open");
        self.send_message(channel, message).await
    }

    async fn role(&self, role: RoleId) -> Result<Option<Role>, ChatError> {
        let key = role.to_string();
        self.guild_roles()
            .await?
            .iter()
            .find(|r| r.id == key)
            .map(RoleDto::to_role)
            .transpose()
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>, ChatError> {
        self.guild_roles()
            .await?
            .iter()
            .find(|r| r.name == name)
            .map(RoleDto::to_role)
            .transpose()
    }

    #[instrument(skip_all, fields(role = %spec.name))]
    async fn create_role(&self, spec: RoleSpec) -> Result<Role, ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"roles"])?;
        let body = CreateRole {
            name: spec.name,
            color: spec.colour,
            hoist: spec.hoist,
        };
        let created: RoleDto = self.rest.send_json(Method::POST, url, &body).await?;
        created.to_role()
    }

    async fn set_role_hoist(&self, role: RoleId, hoist: bool) -> Result<(), ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"roles", &role])?;
        let _: RoleDto = self
            .rest
            .send_json(Method::PATCH, url, &serde_json::json!({ "hoist": hoist }))
            .await?;
        Ok(())
    }

    async fn delete_role(&self, role: RoleId) -> Result<(), ChatError> {
        let url = self.rest.url(&[&"guilds", &self.guild, &"roles", &role])?;
        self.rest
            .send_empty(self.rest.request(Method::DELETE, url))
            .await
    }

    async fn role_members(&self, role: RoleId) -> Result<Vec<Member>, ChatError> {
        let roles = self.guild_roles().await?;
        let key = role.to_string();
        let mut holders = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut url = self.rest.url(&[&"guilds", &self.guild, &"members"])?;
            url.query_pairs_mut()
                .append_pair("limit", &MEMBER_PAGE.to_string());
            if let Some(after) = &after {
                url.query_pairs_mut().append_pair("after", after);
            }
            let page: Vec<GuildMemberDto> = self.rest.get(url).await?;
            for dto in page.iter().filter(|m| m.roles.contains(&key)) {
                holders.push(Self::to_member(dto, &roles)?);
            }
            match page.last() {
                Some(last) if page.len() == MEMBER_PAGE => after = Some(last.user.id.clone()),
                _ => return Ok(holders),
            }
        }
    }

    async fn category(&self, category: CategoryId) -> Result<Option<Category>, ChatError> {
        match self.channel_dto(category.as_u64()).await? {
            Some(dto) if dto.is_category() => dto.to_category().map(Some),
            _ => Ok(None),
        }
    }

    async fn find_category(&self, name: &str) -> Result<Option<Category>, ChatError> {
        self.guild_channels()
            .await?
            .iter()
            .find(|c| c.is_category() && c.name.as_deref() == Some(name))
            .map(ChannelDto::to_category)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn create_category(
        &self,
        name: &str,
        visible_to: Option<RoleId>,
    ) -> Result<Category, ChatError> {
        let created = self
            .create_guild_channel(CreateChannel {
                name: name.to_string(),
                kind: CATEGORY_CHANNEL,
                parent_id: None,
                permission_overwrites: self.overwrites(visible_to),
            })
            .await?;
        created.to_category()
    }

    async fn delete_category(&self, category: CategoryId) -> Result<(), ChatError> {
        self.delete_guild_channel(category.as_u64()).await
    }

    async fn category_channels(&self, category: CategoryId) -> Result<Vec<Channel>, ChatError> {
        let parent = category.to_string();
        self.guild_channels()
            .await?
            .iter()
            .filter(|c| !c.is_category() && c.parent_id.as_deref() == Some(parent.as_str()))
            .map(ChannelDto::to_channel)
            .collect()
    }

    async fn channel(&self, channel: ChannelId) -> Result<Option<Channel>, ChatError> {
        match self.channel_dto(channel.as_u64()).await? {
            Some(dto) if !dto.is_category() => dto.to_channel().map(Some),
            _ => Ok(None),
        }
    }

    #[instrument(skip_all, fields(channel = %spec.name))]
    async fn create_channel(&self, spec: ChannelSpec) -> Result<Channel, ChatError> {
        let created = self
            .create_guild_channel(CreateChannel {
                permission_overwrites: self.overwrites(spec.visible_to),
                name: spec.name,
                kind: match spec.kind {
                    ChannelKind::Text => TEXT_CHANNEL,
                    ChannelKind::Voice => VOICE_CHANNEL,
                },
                parent_id: spec.category.map(|c| c.to_string()),
            })
            .await?;
        created.to_channel()
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError> {
        self.delete_guild_channel(channel.as_u64()).await
    }
}
