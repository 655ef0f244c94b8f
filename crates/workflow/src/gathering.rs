//! Participant Gatherer.
//!
//! After approval every participant is asked for an external username. The
//! slug-named role doubles as the response register: a participant who
//! submitted a valid identity holds it. When the gathering window closes the
//! holders are counted against the sliding quota.

use community::{
    gathering_quota_met, remaining_wait, required_ratio, solicitation_embed, ChannelId,
    ChatError, ExternalUser, Member, MemberId, Message, MessageId, MarkerKind, OutgoingMessage,
    Role, RoleId, RoleSpec, Settings, Slug, SourceHostError, Team, Timestamp, UserMembership,
    UserRef, ExternalUsername,
};
use tracing::{debug, info, warn as log_warn};

use crate::markers::purge_markers;
use crate::votes::describe_window;
use crate::{discipline, mention, provisioner, Services, WorkflowResult};

/// Result of checking a submitted identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// The identity resolved; the member now holds the role and the
    /// membership record points at this user.
    Accepted(ExternalUser),
    /// The member already holds the role under this exact identity.
    Redundant(ExternalUser),
    /// No role exists for the slug.
    RoleMissing,
    /// The username does not exist on the source host.
    Invalid,
}

/// How a gathering window ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GatheringOutcome {
    /// The quota was met and the team is provisioned.
    Approved(Team),
    /// Too few participants responded. The role and pending memberships are gone.
    Cancelled,
    /// The slug role disappeared or lost every holder during the window.
    RoleVanished,
    /// The approval announcement was deleted while waiting.
    Abandoned,
}

/// The team role for `slug`: the recorded one when a team exists, otherwise
/// the role carrying the slug's name.
pub async fn slug_role(services: &Services, slug: &Slug) -> WorkflowResult<Option<Role>> {
    if let Some(team) = services.store.team(slug).await? {
        if let Some(role) = services.chat.role(team.role_id).await? {
            return Ok(Some(role));
        }
    }
    Ok(services.chat.find_role(slug.as_str()).await?)
}

/// Applies the identity acceptance rule for `member` submitting `login`
/// towards `slug`.
pub async fn accept_identity(
    services: &Services,
    member: &Member,
    slug: &Slug,
    login: &str,
) -> WorkflowResult<IdentityOutcome> {
    let user = match services.source.user_by_login(login.trim()).await {
        Ok(user) => user,
        Err(SourceHostError::UnknownUser { .. }) => return Ok(IdentityOutcome::Invalid),
        Err(err) => return Err(err.into()),
    };
    let Some(role) = slug_role(services, slug).await? else {
        return Ok(IdentityOutcome::RoleMissing);
    };

    let previous = services.store.membership(member.id, slug).await?;
    if member.has_role(role.id) && previous.is_some_and(|p| p.external_user_id == user.id) {
        debug!(member = %member.id, %slug, "identity already on record");
        return Ok(IdentityOutcome::Redundant(user));
    }

    grant_identity(services, member.id, slug, role.id, &user).await?;
    Ok(IdentityOutcome::Accepted(user))
}

/// Grants the role and records (or replaces) the membership.
pub async fn grant_identity(
    services: &Services,
    member: MemberId,
    slug: &Slug,
    role: RoleId,
    user: &ExternalUser,
) -> WorkflowResult<()> {
    services.chat.add_role(member, role).await?;
    let Some(external_username) = ExternalUsername::new(user.login.clone()) else {
        return Err(crate::WorkflowError::not_found(format!(
            "login for external user {}",
            user.id
        )));
    };
    services
        .store
        .save_membership(&UserMembership {
            member_id: member,
            team_slug: slug.clone(),
            external_username,
            external_user_id: user.id,
        })
        .await?;
    info!(%member, %slug, login = %user.login, "identity accepted");
    Ok(())
}

/// Asks `member` for their external username. Falls back to the
/// failed-delivery channel when the member refuses DMs.
pub async fn solicit(
    services: &Services,
    settings: &Settings,
    member: MemberId,
    slug: &Slug,
) -> WorkflowResult<()> {
    let request = OutgoingMessage::with_embed(
        format!(
            "{}, the `{slug}` idea you voted for was approved! Please reply with your GitHub \
             username (just the username) to be added to the team.",
            mention(member)
        ),
        solicitation_embed(slug, services.guild),
    );
    match services.chat.send_direct(member, request.clone()).await {
        Ok(sent) => clear_stale(services, sent.channel_id).await,
        Err(err) if err.is_forbidden() => {
            debug!(%member, %slug, "DMs closed, soliciting in the messages channel");
            services
                .chat
                .send_message(settings.messages_channel, request)
                .await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Deletes bot embed messages left in `channel` by a previous run.
async fn clear_stale(services: &Services, channel: ChannelId) -> WorkflowResult<()> {
    for message in services.chat.channel_history(channel).await? {
        if is_stale(&message, services.online_since) {
            ignore_missing(services.chat.delete_message(channel, message.id).await)?;
        }
    }
    Ok(())
}

fn is_stale(message: &Message, online_since: Timestamp) -> bool {
    message.author.bot && !message.embeds.is_empty() && message.created_at < online_since
}

fn ignore_missing(result: Result<(), ChatError>) -> Result<(), ChatError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// Runs a gathering window anchored on the approval announcement.
///
/// Everyone in `to_solicit` is asked for an identity first; bots get the role
/// straight away.
pub async fn gather(
    services: &Services,
    slug: &Slug,
    announcement: MessageId,
    to_solicit: &[UserRef],
) -> WorkflowResult<GatheringOutcome> {
    let settings = services.settings().await?;
    let role = match services.chat.find_role(slug.as_str()).await? {
        Some(role) => role,
        None => {
            services
                .chat
                .create_role(RoleSpec {
                    name: slug.to_string(),
                    colour: None,
                    hoist: false,
                })
                .await?
        }
    };
    for participant in to_solicit {
        if participant.bot {
            services.chat.add_role(participant.id, role.id).await?;
        } else {
            solicit(services, &settings, participant.id, slug).await?;
        }
    }

    let Some(message) = fetch_announcement(services, &settings, announcement).await? else {
        return Ok(GatheringOutcome::Abandoned);
    };
    let wait = remaining_wait(message.anchor(), settings.gathering_window, Timestamp::now());
    debug!(%slug, seconds = wait.total_seconds(), "waiting for identities");
    tokio::time::sleep(wait.as_duration()).await;

    let settings = services.settings().await?;
    let Some(message) = fetch_announcement(services, &settings, announcement).await? else {
        return Ok(GatheringOutcome::Abandoned);
    };
    conclude(services, &settings, slug, &message).await
}

/// Resumes a gathering window after a restart. Participants who are still
/// members and have not responded are solicited again.
pub async fn resume(
    services: &Services,
    slug: &Slug,
    announcement: MessageId,
) -> WorkflowResult<GatheringOutcome> {
    let settings = services.settings().await?;
    let Some(message) = fetch_announcement(services, &settings, announcement).await? else {
        return Ok(GatheringOutcome::Abandoned);
    };
    let role = services.chat.find_role(slug.as_str()).await?;
    let holders = match &role {
        Some(role) => services.chat.role_members(role.id).await?,
        None => Vec::new(),
    };

    let mut pending = Vec::new();
    for participant in &message.mentions {
        if holders.iter().any(|h| h.id == participant.id) {
            continue;
        }
        if services.chat.member(participant.id).await?.is_some() {
            pending.push(*participant);
        }
    }

    let n = message.mentions.len();
    let wait = remaining_wait(message.anchor(), settings.gathering_window, Timestamp::now());
    services
        .say(
            settings.overview_channel,
            format!(
                "Resuming the `{slug}` idea: {} remaining. `{:.0}%` of participants must respond, \
                 `{}%` have so far.",
                describe_window(wait.total_seconds()),
                required_ratio(n) * 100.0,
                percent(holders.len(), n),
            ),
        )
        .await?;
    gather(services, slug, announcement, &pending).await
}

async fn fetch_announcement(
    services: &Services,
    settings: &Settings,
    announcement: MessageId,
) -> WorkflowResult<Option<Message>> {
    match services
        .chat
        .fetch_message(settings.overview_channel, announcement)
        .await
    {
        Ok(message) => Ok(Some(message)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn conclude(
    services: &Services,
    settings: &Settings,
    slug: &Slug,
    announcement: &Message,
) -> WorkflowResult<GatheringOutcome> {
    let overview = settings.overview_channel;
    let holders = match services.chat.find_role(slug.as_str()).await? {
        Some(role) => Some((role.id, services.chat.role_members(role.id).await?)),
        None => None,
    };
    let Some((role, holders)) = holders.filter(|(_, holders)| !holders.is_empty()) else {
        log_warn!(%slug, "slug role vanished during gathering");
        services
            .say(
                overview,
                format!("Error: the `{slug}` role has no members any more, the idea is dropped."),
            )
            .await?;
        ignore_missing(services.chat.delete_message(overview, announcement.id).await)?;
        return Ok(GatheringOutcome::RoleVanished);
    };

    let participants = &announcement.mentions;
    let responded = |id: MemberId| holders.iter().any(|h| h.id == id);
    for participant in participants.iter().filter(|p| !p.bot && !responded(p.id)) {
        if services.chat.member(participant.id).await?.is_none() {
            continue;
        }
        let reason = format!("Not submitting a GitHub username for `{slug}`");
        if let Err(err) = discipline::warn(services, participant.id, &reason).await {
            log_warn!(member = %participant.id, %slug, error = %err, "could not warn participant");
        }
    }

    let n = participants.len();
    let met = gathering_quota_met(holders.len(), n);
    info!(%slug, responded = holders.len(), participants = n, met, "gathering window closed");

    let outcome = if met {
        services
            .say(
                overview,
                format!(
                    "The `{slug}` idea has enough participants (`{}%`), creating the team!",
                    percent(holders.len(), n)
                ),
            )
            .await?;
        ignore_missing(services.chat.delete_message(overview, announcement.id).await)?;
        let team = provisioner::provision(services, slug).await?;
        GatheringOutcome::Approved(team)
    } else {
        services
            .say(
                overview,
                format!(
                    "The `{slug}` idea has been cancelled: only `{}%` of participants sent a \
                     GitHub username, `{:.0}%` were needed.",
                    percent(holders.len(), n),
                    required_ratio(n) * 100.0
                ),
            )
            .await?;
        ignore_missing(services.chat.delete_role(role).await)?;
        services.store.delete_memberships_for_team(slug).await?;
        ignore_missing(services.chat.delete_message(overview, announcement.id).await)?;
        GatheringOutcome::Cancelled
    };

    for participant in participants.iter().filter(|p| !p.bot) {
        let text = match (&outcome, responded(participant.id)) {
            (GatheringOutcome::Approved(_), true) => {
                format!("The `{slug}` team has been created, have fun!")
            }
            (GatheringOutcome::Approved(_), false) => format!(
                "The `{slug}` team has been created without you since you did not send a GitHub \
                 username. Use `add_me` to join later."
            ),
            _ => format!("The `{slug}` idea was cancelled, not enough participants responded."),
        };
        notify(services, participant.id, slug, text).await?;
    }
    purge_markers(
        &*services.chat,
        settings.messages_channel,
        slug,
        MarkerKind::Solicitation,
    )
    .await?;
    Ok(outcome)
}

/// DMs the outcome and clears the member's solicitation for `slug`.
async fn notify(
    services: &Services,
    member: MemberId,
    slug: &Slug,
    text: String,
) -> WorkflowResult<()> {
    match services
        .chat
        .send_direct(member, OutgoingMessage::text(text))
        .await
    {
        Ok(sent) => {
            purge_markers(
                &*services.chat,
                sent.channel_id,
                slug,
                MarkerKind::Solicitation,
            )
            .await?;
            Ok(())
        }
        Err(err) if err.is_forbidden() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn percent(part: usize, whole: usize) -> usize {
    if whole == 0 {
        return 0;
    }
    part * 100 / whole
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, BOT_ID, GATHERING_WINDOW_SECS};
    use community::{Embed, TeamStore, UserStore, WarnStore};
    use std::time::Duration;

    fn slug() -> Slug {
        Slug::parse("idea-board").unwrap()
    }

    fn announce(h: &Harness, participants: &[MemberId]) -> Message {
        let mentions: Vec<String> = participants.iter().map(|p| mention(*p)).collect();
        h.chat.post_as_bot(
            h.channels.overview,
            OutgoingMessage::with_embed(
                format!("Voting has ended, approved!\n{}", mentions.join("\n")),
                Embed::titled("idea-board"),
            ),
        )
    }

    fn users(ids: &[MemberId]) -> Vec<UserRef> {
        ids.iter()
            .map(|id| UserRef { id: *id, bot: false })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn seven_of_ten_responding_provisions_once() {
        let h = Harness::new().await;
        let participants = h.members(10, 10);
        let role = h.chat.add_role("idea-board");
        for member in &participants[..7] {
            h.chat.grant(*member, role);
        }
        let announcement = announce(&h, &participants);

        let outcome = gather(&h.services, &slug(), announcement.id, &users(&participants))
            .await
            .unwrap();

        let GatheringOutcome::Approved(team) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        assert_eq!(team.role_id, role);
        assert_eq!(h.source.count_calls("create_repository"), 1);
        assert!(h.store.team(&slug()).await.unwrap().is_some());
        for late in &participants[7..] {
            assert_eq!(h.store.warnings(*late).await.unwrap(), 1);
        }
        assert!(h.chat.messages(h.channels.overview).iter().all(|m| m.id != announcement.id));
    }

    #[tokio::test(start_paused = true)]
    async fn an_unkickable_late_participant_does_not_block_approval() {
        let h = Harness::new().await;
        let participants = h.members(10, 10);
        let role = h.chat.add_role("idea-board");
        for member in &participants[..7] {
            h.chat.grant(*member, role);
        }
        let stubborn = participants[9];
        h.chat.outrank_bot(stubborn);
        h.store.add_warning(stubborn).await.unwrap();
        h.store.add_warning(stubborn).await.unwrap();
        let announcement = announce(&h, &participants);

        let outcome = gather(&h.services, &slug(), announcement.id, &[]).await.unwrap();

        assert!(matches!(outcome, GatheringOutcome::Approved(_)), "{outcome:?}");
        assert!(h.store.team(&slug()).await.unwrap().is_some());
        assert!(h.chat.messages(h.channels.overview).iter().all(|m| m.id != announcement.id));
        assert!(h.chat.kicked().is_empty());
        assert!(h
            .chat
            .messages(h.channels.bot)
            .iter()
            .any(|m| m.content == format!("Could not kick {}", mention(stubborn))));
    }

    #[tokio::test(start_paused = true)]
    async fn six_of_ten_responding_cancels_and_cleans_up() {
        let h = Harness::new().await;
        let participants = h.members(10, 10);
        let role = h.chat.add_role("idea-board");
        for member in &participants[..6] {
            h.chat.grant(*member, role);
        }
        let user = h.source.add_user("ada");
        h.store
            .save_membership(&UserMembership {
                member_id: participants[0],
                team_slug: slug(),
                external_username: ExternalUsername::new("ada").unwrap(),
                external_user_id: user.id,
            })
            .await
            .unwrap();
        let announcement = announce(&h, &participants);

        let outcome = gather(&h.services, &slug(), announcement.id, &[]).await.unwrap();

        assert_eq!(outcome, GatheringOutcome::Cancelled);
        assert_eq!(h.chat.count_calls("delete_role:idea-board"), 1);
        assert!(h.store.memberships_for_team(&slug()).await.unwrap().is_empty());
        assert!(h.store.team(&slug()).await.unwrap().is_none());
        assert_eq!(h.source.count_calls("create_team"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_role_aborts_without_a_team() {
        let h = Harness::new().await;
        let participants = h.members(10, 3);
        h.chat.add_role("idea-board");
        let announcement = announce(&h, &participants);

        let outcome = gather(&h.services, &slug(), announcement.id, &[]).await.unwrap();
        assert_eq!(outcome, GatheringOutcome::RoleVanished);
        assert!(h.store.team(&slug()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn bots_get_the_role_and_members_are_solicited() {
        let h = Harness::new().await;
        let member = h.chat.add_member(10);
        let closed = h.chat.add_member(11);
        h.chat.close_dms(closed);
        let announcement = announce(&h, &[BOT_ID, member, closed]);
        let to_solicit = vec![
            UserRef { id: BOT_ID, bot: true },
            UserRef { id: member, bot: false },
            UserRef { id: closed, bot: false },
        ];

        let task = tokio::spawn({
            let services = h.services.clone();
            async move { gather(&services, &slug(), announcement.id, &to_solicit).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let role = h.chat.find_role_id("idea-board").unwrap();
        assert_eq!(h.chat.holders(role), vec![BOT_ID]);
        let dm = h.chat.direct_messages(member);
        assert_eq!(dm.len(), 1);
        assert_eq!(dm[0].embed_title(), Some("idea-board"));
        let fallback = h.chat.messages(h.channels.messages);
        assert!(fallback[0].mentions_member(closed));

        tokio::time::sleep(Duration::from_secs(GATHERING_WINDOW_SECS)).await;
        let outcome = task.await.unwrap().unwrap();
        // One holder out of three: 33% against a 77% quota.
        assert_eq!(outcome, GatheringOutcome::Cancelled);
        assert!(h.chat.messages(h.channels.messages).is_empty(), "fallback solicitation purged");
        assert!(h
            .chat
            .direct_messages(member)
            .iter()
            .all(|m| m.embeds.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_solicits_only_members_still_missing_the_role() {
        let h = Harness::new().await;
        let responded = h.chat.add_member(10);
        let pending = h.chat.add_member(11);
        let departed = MemberId::new(12);
        let role = h.chat.add_role("idea-board");
        h.chat.grant(responded, role);
        let announcement = announce(&h, &[responded, pending, departed]);

        let task = tokio::spawn({
            let services = h.services.clone();
            async move { resume(&services, &slug(), announcement.id).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(h.chat.direct_messages(responded).is_empty());
        assert!(h.chat.direct_messages(departed).is_empty());
        let asked = h.chat.direct_messages(pending);
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0].embed_title(), Some("idea-board"));
        assert!(h
            .chat
            .messages(h.channels.overview)
            .iter()
            .any(|m| m.content.starts_with("Resuming the `idea-board` idea")));

        tokio::time::sleep(Duration::from_secs(GATHERING_WINDOW_SECS)).await;
        let outcome = task.await.unwrap().unwrap();
        // One holder out of three mentioned participants.
        assert_eq!(outcome, GatheringOutcome::Cancelled);
        assert_eq!(h.store.warnings(pending).await.unwrap(), 1);
        assert_eq!(h.store.warnings(departed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn identical_resubmission_is_redundant() {
        let h = Harness::new().await;
        let role = h.chat.add_role("idea-board");
        let id = h.chat.add_member(10);
        h.source.add_user("Ada");

        let member = h.services.chat.member(id).await.unwrap().unwrap();
        let first = accept_identity(&h.services, &member, &slug(), "ada").await.unwrap();
        assert!(matches!(first, IdentityOutcome::Accepted(_)));

        let member = h.services.chat.member(id).await.unwrap().unwrap();
        let second = accept_identity(&h.services, &member, &slug(), "ada").await.unwrap();
        assert!(matches!(second, IdentityOutcome::Redundant(_)));
        assert_eq!(h.chat.count_calls(&format!("add_role:{id}:{role}")), 1);
        assert_eq!(h.store.memberships_for_team(&slug()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_logins_and_missing_roles_are_reported() {
        let h = Harness::new().await;
        let id = h.chat.add_member(10);
        h.source.add_user("ada");
        let member = h.services.chat.member(id).await.unwrap().unwrap();

        let missing = accept_identity(&h.services, &member, &slug(), "ada").await.unwrap();
        assert_eq!(missing, IdentityOutcome::RoleMissing);

        h.chat.add_role("idea-board");
        let invalid = accept_identity(&h.services, &member, &slug(), "nobody").await.unwrap();
        assert_eq!(invalid, IdentityOutcome::Invalid);
    }
}
