//! Identity submissions and joining or leaving existing teams.

use community::{ChannelId, MarkerKind, MemberId, Slug, SourceHostError, Team};
use tracing::info;

use crate::coordinator::Coordinator;
use crate::gathering::{accept_identity, grant_identity, IdentityOutcome};
use crate::markers::{find_pending_marker, solicitations_for};
use crate::prompts::{is_confirmation, CONFIRM_TIMEOUT};
use crate::{leadership, mention, provisioner, WorkflowError, WorkflowResult};

impl Coordinator {
    /// Treats a plain message in a DM or the failed-delivery channel as an
    /// external username answering every open solicitation there.
    pub(crate) async fn submit_identity(
        &self,
        channel: ChannelId,
        author: MemberId,
        direct: bool,
        login: &str,
    ) -> WorkflowResult<()> {
        let settings = self.services.settings().await?;
        if !direct && channel != settings.messages_channel {
            return Ok(());
        }
        let chat = &*self.services.chat;
        let solicitations = solicitations_for(chat, channel, author).await?;
        if solicitations.is_empty() && !direct {
            return Ok(());
        }
        let Some(member) = chat.member(author).await? else {
            return self
                .answer(channel, author, direct, "you are no longer a member of the server.")
                .await;
        };

        let mut accepted = 0;
        for (slug, guild) in solicitations {
            if guild.is_some_and(|g| g != self.services.guild) {
                continue;
            }
            let open = find_pending_marker(
                chat,
                settings.overview_channel,
                &slug,
                MarkerKind::Gathering,
            )
            .await?;
            if open.is_none() {
                continue;
            }
            let text = match accept_identity(&self.services, &member, &slug, login).await? {
                IdentityOutcome::Accepted(user) => {
                    accepted += 1;
                    format!("`{}` was added to the `{slug}` idea.", user.login)
                }
                IdentityOutcome::Redundant(user) => {
                    format!("`{}` is already registered for `{slug}`.", user.login)
                }
                IdentityOutcome::RoleMissing => {
                    format!("the `{slug}` idea no longer exists.")
                }
                IdentityOutcome::Invalid => {
                    format!("`{login}` is not a valid GitHub username.")
                }
            };
            self.answer(channel, author, direct, &text).await?;
        }

        let summary = if accepted > 0 { "done!" } else { "nothing to do." };
        self.answer(channel, author, direct, summary).await
    }

    /// Replies by DM, or with a mention in a shared channel.
    async fn answer(
        &self,
        channel: ChannelId,
        author: MemberId,
        direct: bool,
        text: &str,
    ) -> WorkflowResult<()> {
        if direct {
            self.services.tell(author, text).await
        } else {
            self.services
                .say(channel, format!("{}, {text}", mention(author)))
                .await
        }
    }

    /// Joins `invoker` to an existing team under `username`.
    pub(crate) async fn add_me(
        &self,
        invoker: MemberId,
        channel: ChannelId,
        username: &str,
        team: &str,
    ) -> WorkflowResult<()> {
        let (slug, record) = self.team_record(team).await?;
        let services = &self.services;
        if services.chat.role(record.role_id).await?.is_none() {
            return Err(WorkflowError::not_found(format!("team role for '{slug}'")));
        }
        let Some(member) = services.chat.member(invoker).await? else {
            return Err(WorkflowError::not_found(format!("member {invoker}")));
        };

        let user = match accept_identity(services, &member, &slug, username).await? {
            IdentityOutcome::Accepted(user) => user,
            IdentityOutcome::Redundant(user) => {
                services
                    .say(
                        channel,
                        format!(
                            "{}, you are already in `{slug}` as `{}`. Reply `a: yes` within {} \
                             seconds to be added again.",
                            mention(invoker),
                            user.login,
                            CONFIRM_TIMEOUT.as_secs()
                        ),
                    )
                    .await?;
                let confirmed = self
                    .prompts
                    .wait_for(channel, invoker, CONFIRM_TIMEOUT, |c| is_confirmation('a', c))
                    .await;
                if confirmed.is_none() {
                    services
                        .say(channel, format!("{}, cancelled.", mention(invoker)))
                        .await?;
                    return Ok(());
                }
                grant_identity(services, invoker, &slug, record.role_id, &user).await?;
                user
            }
            IdentityOutcome::RoleMissing => {
                return Err(WorkflowError::not_found(format!("team role for '{slug}'")));
            }
            IdentityOutcome::Invalid => {
                services
                    .say(
                        channel,
                        format!("`{username}` is not a valid GitHub username."),
                    )
                    .await?;
                return Ok(());
            }
        };

        let Some(external) = services.source.team_by_id(record.external_team_id).await? else {
            return Err(WorkflowError::not_found(format!("GitHub team for '{slug}'")));
        };
        provisioner::add_membership(services, &slug, &member, &external).await?;
        if let Some(voting) = record.voting_channel_id {
            leadership::solicit_candidate(&*services.chat, voting, invoker).await?;
        }
        info!(member = %invoker, %slug, login = %user.login, "member joined team");
        services
            .say(
                channel,
                format!("{} has been added to `{slug}`!", mention(invoker)),
            )
            .await
    }

    /// Removes `invoker` from a team: roles, external team and candidacy.
    pub(crate) async fn remove_me(
        &self,
        invoker: MemberId,
        channel: ChannelId,
        team: &str,
    ) -> WorkflowResult<()> {
        let (slug, record) = self.team_record(team).await?;
        let services = &self.services;
        services.chat.remove_role(invoker, record.role_id).await?;
        services.chat.remove_role(invoker, record.leader_role_id).await?;

        if let Some(membership) = services.store.membership(invoker, &slug).await? {
            match services.source.user_by_id(membership.external_user_id).await {
                Ok(user) => {
                    if let Some(external) =
                        services.source.team_by_id(record.external_team_id).await?
                    {
                        services.source.remove_team_member(&external, &user).await?;
                    }
                }
                Err(SourceHostError::NotFound { .. }) | Err(SourceHostError::UnknownUser { .. }) => {
                    services
                        .say(
                            channel,
                            format!(
                                "{}, your GitHub account `{}` no longer exists, it could not be \
                                 removed from the team.",
                                mention(invoker),
                                membership.external_username
                            ),
                        )
                        .await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        if let Some(voting) = record.voting_channel_id {
            leadership::withdraw_candidate(&*services.chat, voting, invoker).await?;
        }
        info!(member = %invoker, %slug, "member left team");
        services
            .say(
                channel,
                format!("{} has been removed from `{slug}`.", mention(invoker)),
            )
            .await
    }

    /// Looks up a team by the name a member typed.
    pub(crate) async fn team_record(&self, name: &str) -> WorkflowResult<(Slug, Team)> {
        let slug = Slug::derive(name)?;
        match self.services.store.team(&slug).await? {
            Some(record) => Ok((slug, record)),
            None => Err(WorkflowError::not_found(format!("team '{slug}'"))),
        }
    }
}
