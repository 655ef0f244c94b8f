//! Team Provisioner.
//!
//! Every step is get-or-create by name, so provisioning the same slug twice
//! converges on one role, one leader role, one category with its two
//! channels, one external team and one repository.

use community::{
    Category, Channel, ChannelKind, ChannelSpec, ExternalTeam, Marker, MarkerKind, Member,
    OutgoingMessage, Repository, Role, RoleSpec, Settings, Slug, SourceHostError, Team,
    Embed,
};
use tracing::{info, info_span, Instrument};

use crate::markers::find_pending_marker;
use crate::{leadership, Services, WorkflowResult};

pub const GENERAL_CHANNEL: &str = "general";
pub const VOICE_CHANNEL: &str = "Collab room";

/// Colour of the leader role (`#ff0000`).
pub const LEADER_COLOUR: u32 = 16_711_680;

/// Provisions the team for `slug` and opens leader voting.
pub async fn provision(services: &Services, slug: &Slug) -> WorkflowResult<Team> {
    let span = info_span!("provision", slug = %slug);
    async move {
        let settings = services.settings().await?;
        let existing = services.store.team(slug).await?;

        let role = team_role(services, slug, existing.as_ref()).await?;
        let leader_role = leader_role(services, slug, existing.as_ref()).await?;
        services.chat.set_role_hoist(role.id, true).await?;

        let category = category(services, slug, &role).await?;
        let general = channels(services, &category, &role).await?;

        let members = services.chat.role_members(role.id).await?;
        let external_team = external_team(services, slug, &members).await?;
        let repository = repository(services, slug, &external_team).await?;

        let team = Team {
            slug: slug.clone(),
            role_id: role.id,
            leader_role_id: leader_role.id,
            category_id: category.id,
            channel_id: general.id,
            external_team_id: external_team.id,
            repository_id: repository.id,
            voting_channel_id: existing.and_then(|t| t.voting_channel_id),
        };
        services.store.save_team(&team).await?;
        info!(role = %role.id, repository = %repository.id, "team record saved");

        announce(services, &settings, &team, &external_team, &repository, general.id).await?;
        leadership::open_voting(services, &team).await?;
        Ok(team)
    }
    .instrument(span)
    .await
}

async fn team_role(services: &Services, slug: &Slug, existing: Option<&Team>) -> WorkflowResult<Role> {
    let chat = &services.chat;
    let known = match existing {
        Some(team) => chat.role(team.role_id).await?,
        None => None,
    };
    let role = match known {
        Some(role) => role,
        None => match chat.find_role(slug.as_str()).await? {
            Some(role) => role,
            None => {
                chat.create_role(RoleSpec {
                    name: slug.to_string(),
                    colour: None,
                    hoist: true,
                })
                .await?
            }
        },
    };

    // Bots only hold the role to keep it alive during gathering.
    for member in chat.role_members(role.id).await? {
        if member.bot {
            chat.remove_role(member.id, role.id).await?;
        }
    }
    Ok(role)
}

async fn leader_role(
    services: &Services,
    slug: &Slug,
    existing: Option<&Team>,
) -> WorkflowResult<Role> {
    let chat = &services.chat;
    if let Some(team) = existing {
        if let Some(role) = chat.role(team.leader_role_id).await? {
            return Ok(role);
        }
    }
    let name = slug.leader_role_name();
    if let Some(role) = chat.find_role(&name).await? {
        return Ok(role);
    }
    Ok(chat
        .create_role(RoleSpec {
            name,
            colour: Some(LEADER_COLOUR),
            hoist: false,
        })
        .await?)
}

async fn category(services: &Services, slug: &Slug, role: &Role) -> WorkflowResult<Category> {
    let chat = &services.chat;
    match chat.find_category(slug.as_str()).await? {
        Some(category) => Ok(category),
        None => Ok(chat.create_category(slug.as_str(), Some(role.id)).await?),
    }
}

/// Ensures the text and voice channels exist. Returns the text channel.
async fn channels(services: &Services, category: &Category, role: &Role) -> WorkflowResult<Channel> {
    let chat = &services.chat;
    let present = chat.category_channels(category.id).await?;
    let find = |name: &str, kind: ChannelKind| {
        present
            .iter()
            .find(|c| c.name == name && c.kind == kind)
            .cloned()
    };
    let spec = |name: &str, kind: ChannelKind| ChannelSpec {
        name: name.to_string(),
        kind,
        category: Some(category.id),
        visible_to: Some(role.id),
    };

    if find(VOICE_CHANNEL, ChannelKind::Voice).is_none() {
        chat.create_channel(spec(VOICE_CHANNEL, ChannelKind::Voice))
            .await?;
    }
    match find(GENERAL_CHANNEL, ChannelKind::Text) {
        Some(general) => Ok(general),
        None => {
            let general = chat
                .create_channel(spec(GENERAL_CHANNEL, ChannelKind::Text))
                .await?;
            services
                .say(general.id, format!("<@&{}> LET'S GO!!", role.id))
                .await?;
            Ok(general)
        }
    }
}

async fn external_team(
    services: &Services,
    slug: &Slug,
    members: &[Member],
) -> WorkflowResult<ExternalTeam> {
    let team = match services.source.find_team(slug.as_str()).await? {
        Some(team) => team,
        None => services.source.create_team(slug.as_str()).await?,
    };
    for member in members.iter().filter(|m| !m.bot) {
        add_membership(services, slug, member, &team).await?;
    }
    Ok(team)
}

/// Adds a member's recorded identity to the external team. A recorded
/// identity that no longer resolves is reported to the member.
pub async fn add_membership(
    services: &Services,
    slug: &Slug,
    member: &Member,
    team: &ExternalTeam,
) -> WorkflowResult<bool> {
    let Some(record) = services.store.membership(member.id, slug).await? else {
        return Ok(false);
    };
    match services.source.user_by_id(record.external_user_id).await {
        Ok(user) => {
            services.source.add_team_member(team, &user).await?;
            Ok(true)
        }
        Err(SourceHostError::NotFound { .. }) | Err(SourceHostError::UnknownUser { .. }) => {
            services
                .tell(
                    member.id,
                    format!(
                        "There has been a problem adding you to the GitHub team in the `{slug}` \
                         project, perhaps you have changed your GitHub username?"
                    ),
                )
                .await?;
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn repository(
    services: &Services,
    slug: &Slug,
    team: &ExternalTeam,
) -> WorkflowResult<Repository> {
    let repository = match services.source.find_repository(slug.as_str()).await? {
        Some(repository) => repository,
        None => services.source.create_repository(slug.as_str()).await?,
    };
    services
        .source
        .grant_team_repository(team, &repository)
        .await?;
    Ok(repository)
}

async fn announce(
    services: &Services,
    settings: &Settings,
    team: &Team,
    external_team: &ExternalTeam,
    repository: &Repository,
    general: community::ChannelId,
) -> WorkflowResult<()> {
    let running = find_pending_marker(
        &*services.chat,
        settings.running_channel,
        &team.slug,
        MarkerKind::Running,
    )
    .await?;
    if matches!(running, Some(Marker::Running { .. })) {
        return Ok(());
    }

    let team_url = services.source.team_url(external_team);
    let repository_url = services.source.repository_url(repository);
    services.say(general, team_url).await?;
    services.say(general, repository_url.clone()).await?;
    services
        .chat
        .send_message(
            settings.running_channel,
            OutgoingMessage::with_embed(
                format!(
                    "A new team has been created!\n{repository_url}\n\
                     Please use `add_me \"your GitHub username\" \"{}\"` to be added.",
                    team.slug
                ),
                Embed::titled(team.slug.as_str()),
            ),
        )
        .await?;
    Ok(())
}
