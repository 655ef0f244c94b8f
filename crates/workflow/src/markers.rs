//! Marker queries over channel history.
//!
//! The only place in the workflow that walks raw channel history. Everything
//! else asks for a [`Marker`] by slug and kind.

use community::{
    ChannelId, ChatError, ChatPlatform, GuildId, Marker, MarkerKind, MemberId, Message, Slug,
};

/// The newest bot-authored marker of `kind` titled `slug` in `channel`.
pub async fn find_pending_marker(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    slug: &Slug,
    kind: MarkerKind,
) -> Result<Option<Marker>, ChatError> {
    Ok(chat
        .channel_history(channel)
        .await?
        .iter()
        .filter_map(|m| Marker::read(kind, m))
        .find(|marker| marker.slug() == slug))
}

/// Every marker of `kind` in `channel`, newest first, with its message.
pub async fn pending_markers(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    kind: MarkerKind,
) -> Result<Vec<(Message, Marker)>, ChatError> {
    Ok(chat
        .channel_history(channel)
        .await?
        .into_iter()
        .filter_map(|m| Marker::read(kind, &m).map(|marker| (m, marker)))
        .collect())
}

/// Deletes every marker of `kind` titled `slug` in `channel`. Returns how many
/// were removed.
pub async fn purge_markers(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    slug: &Slug,
    kind: MarkerKind,
) -> Result<usize, ChatError> {
    let mut removed = 0;
    for marker in find_all(chat, channel, slug, kind).await? {
        match chat.delete_message(channel, marker.message()).await {
            Ok(()) => removed += 1,
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(removed)
}

/// Slugs of the solicitations in `channel` addressed to `member`, newest
/// first, without duplicates.
pub async fn solicitations_for(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    member: MemberId,
) -> Result<Vec<(Slug, Option<GuildId>)>, ChatError> {
    let mut found: Vec<(Slug, Option<GuildId>)> = Vec::new();
    for message in chat.channel_history(channel).await? {
        if !message.mentions_member(member) {
            continue;
        }
        if let Some(Marker::Solicitation { slug, guild, .. }) =
            Marker::read(MarkerKind::Solicitation, &message)
        {
            if !found.iter().any(|(s, _)| *s == slug) {
                found.push((slug, guild));
            }
        }
    }
    Ok(found)
}

async fn find_all(
    chat: &dyn ChatPlatform,
    channel: ChannelId,
    slug: &Slug,
    kind: MarkerKind,
) -> Result<Vec<Marker>, ChatError> {
    Ok(pending_markers(chat, channel, kind)
        .await?
        .into_iter()
        .map(|(_, marker)| marker)
        .filter(|marker| marker.slug() == slug)
        .collect())
}
