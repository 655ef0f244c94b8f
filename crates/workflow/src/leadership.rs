//! Leader-Election Initiator.
//!
//! Each team gets a `leader-voting` channel visible to its role. Every non-bot
//! member of the role is represented by one bot message mentioning them, with
//! an approval reaction members vote with.

use community::{
    ChannelId, ChannelKind, ChannelSpec, ChatPlatform, MemberId, MessageId, OutgoingMessage, Team,
    APPROVAL_EMOJI,
};
use tracing::info;

use crate::{mention, Services, WorkflowError, WorkflowResult};

pub const VOTING_CHANNEL_NAME: &str = "leader-voting";

/// Opens the team's voting channel, or reuses the one already in its
/// category, records it on the team and solicits every member not yet
/// solicited.
pub async fn open_voting(services: &Services, team: &Team) -> WorkflowResult<ChannelId> {
    let chat = &*services.chat;
    let Some(role) = chat.role(team.role_id).await? else {
        return Err(WorkflowError::not_found(format!(
            "team role for '{}'",
            team.slug
        )));
    };

    let existing = chat
        .category_channels(team.category_id)
        .await?
        .into_iter()
        .find(|c| c.name == VOTING_CHANNEL_NAME && c.kind == ChannelKind::Text);
    let channel = match existing {
        Some(channel) => channel.id,
        None => {
            let channel = chat
                .create_channel(ChannelSpec {
                    name: VOTING_CHANNEL_NAME.to_string(),
                    kind: ChannelKind::Text,
                    category: Some(team.category_id),
                    visible_to: Some(role.id),
                })
                .await?;
            services
                .say(channel.id, "Vote for who you would like to be the project leader")
                .await?;
            channel.id
        }
    };
    services
        .store
        .set_voting_channel(&team.slug, Some(channel))
        .await?;

    let mut solicited = 0;
    for member in chat.role_members(role.id).await? {
        if member.bot {
            continue;
        }
        if solicit_candidate(chat, channel, member.id).await? {
            solicited += 1;
        }
    }
    info!(slug = %team.slug, %channel, solicited, "leader voting open");
    Ok(channel)
}

/// Posts a candidacy message for `member` unless one exists. Returns `true`
/// when a message was posted.
pub async fn solicit_candidate(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    member: MemberId,
) -> WorkflowResult<bool> {
    if candidacy(chat, channel, member).await?.is_some() {
        return Ok(false);
    }
    let message = chat
        .send_message(channel, OutgoingMessage::text(mention(member)))
        .await?;
    chat.add_reaction(channel, message.id, APPROVAL_EMOJI)
        .await?;
    Ok(true)
}

/// Deletes `member`'s candidacy message. Returns `true` when one existed.
pub async fn withdraw_candidate(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    member: MemberId,
) -> WorkflowResult<bool> {
    match candidacy(chat, channel, member).await? {
        Some(message) => {
            chat.delete_message(channel, message).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn candidacy(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    member: MemberId,
) -> WorkflowResult<Option<MessageId>> {
    Ok(chat
        .channel_history(channel)
        .await?
        .into_iter()
        .find(|m| m.author.bot && m.mentions.first().is_some_and(|u| u.id == member))
        .map(|m| m.id))
}
