//! Administrative and informational commands.

use community::{
    ChannelId, MarkerKind, SettingKey, Slug, Timestamp, MAX_MANUAL_TEAM_TITLE_CHARS,
};
use tracing::info;

use crate::coordinator::Coordinator;
use crate::markers::purge_markers;
use crate::votes::describe_window;
use crate::{discipline, leadership, mention, provisioner, WorkflowError, WorkflowResult};

/// Contributions older than this many days do not count as activity.
pub const ACTIVITY_WINDOW_DAYS: i64 = 16;

impl Coordinator {
    pub(crate) async fn start_leader_voting(
        &self,
        channel: ChannelId,
        team: &str,
    ) -> WorkflowResult<()> {
        let (slug, record) = self.team_record(team).await?;
        let chat = &self.services.chat;
        if !chat.role_members(record.leader_role_id).await?.is_empty() {
            return self
                .services
                .say(channel, format!("`{slug}` already has a project leader."))
                .await;
        }
        if let Some(voting) = record.voting_channel_id {
            return self
                .services
                .say(channel, format!("Leader voting for `{slug}` is already open in <#{voting}>."))
                .await;
        }
        let voting = leadership::open_voting(&self.services, &record).await?;
        self.services
            .say(channel, format!("Leader voting for `{slug}` is open in <#{voting}>."))
            .await
    }

    /// Provisions a team for a pre-existing group, bypassing the vote.
    pub(crate) async fn create_new_team(&self, channel: ChannelId, title: &str) -> WorkflowResult<()> {
        if title.chars().count() >= MAX_MANUAL_TEAM_TITLE_CHARS {
            return self
                .services
                .say(
                    channel,
                    format!("Team names must be shorter than {MAX_MANUAL_TEAM_TITLE_CHARS} characters."),
                )
                .await;
        }
        let slug = Slug::derive(title)?;
        let Some(_lease) = self.reserve(&slug) else {
            return self
                .services
                .say(
                    channel,
                    format!("`{slug}` is being voted on or provisioned right now, try again later."),
                )
                .await;
        };
        let team = provisioner::provision(&self.services, &slug).await?;
        info!(%slug, role = %team.role_id, "team created by an administrator");
        self.services
            .say(channel, format!("The `{slug}` team has been created."))
            .await
    }

    /// Tears a team down on both platforms.
    pub(crate) async fn delete_team(&self, channel: ChannelId, team: &str) -> WorkflowResult<()> {
        let (slug, record) = self.team_record(team).await?;
        let services = &self.services;
        let chat = &services.chat;

        let roles = [record.role_id, record.leader_role_id];
        for role in roles {
            if chat.role(role).await?.is_some_and(|r| r.administrator) {
                return Err(WorkflowError::permission_denied(format!(
                    "a role of '{slug}' has administrator permissions"
                )));
            }
        }

        if let Some(external) = services.source.team_by_id(record.external_team_id).await? {
            services.source.delete_team(&external).await?;
        }
        for team_channel in chat.category_channels(record.category_id).await? {
            chat.delete_channel(team_channel.id).await?;
        }
        if chat.category(record.category_id).await?.is_some() {
            chat.delete_category(record.category_id).await?;
        }
        for role in roles {
            if chat.role(role).await?.is_some() {
                chat.delete_role(role).await?;
            }
        }
        services.store.delete_team(&slug).await?;
        services.store.delete_memberships_for_team(&slug).await?;

        let settings = services.settings().await?;
        purge_markers(&**chat, settings.running_channel, &slug, MarkerKind::Running).await?;
        info!(%slug, "team deleted");
        services
            .say(channel, format!("The `{slug}` team has been deleted."))
            .await
    }

    /// Warns every recorded member without commits in the last
    /// [`ACTIVITY_WINDOW_DAYS`] days. Only runs on Saturdays (UTC).
    pub(crate) async fn activity_check(&self, channel: ChannelId, now: Timestamp) -> WorkflowResult<()> {
        let services = &self.services;
        if !now.is_saturday() {
            return services
                .say(channel, "The activity check can only be run on Saturdays.")
                .await;
        }
        let settings = services.settings().await?;

        let mut warned = 0;
        for membership in services.store.all_memberships().await? {
            let slug = &membership.team_slug;
            let member = membership.member_id;
            if services.chat.member(member).await?.is_none() {
                continue;
            }
            let Some(team) = services.store.team(slug).await? else {
                continue;
            };
            if services.chat.role(team.role_id).await?.is_none() {
                continue;
            }
            let Some(repository) = services.source.repository_by_id(team.repository_id).await?
            else {
                continue;
            };

            let weeks = services.source.contribution_weeks(&repository).await?;
            let active = weeks.iter().any(|w| {
                w.author == membership.external_user_id
                    && w.commits > 0
                    && now.days_since(w.week_start) < ACTIVITY_WINDOW_DAYS
            });
            let status = if active { "active" } else { "inactive" };
            services
                .say(
                    settings.bot_channel,
                    format!("{} in `{slug}`: {status}", mention(member)),
                )
                .await?;
            if !active {
                discipline::warn(
                    services,
                    member,
                    &format!("No contributions to `{slug}` in the last {ACTIVITY_WINDOW_DAYS} days"),
                )
                .await?;
                warned += 1;
            }
        }
        info!(warned, "activity check finished");
        services
            .say(channel, format!("Activity check finished, `{warned}` warning(s) issued."))
            .await
    }

    pub(crate) async fn set_setting(
        &self,
        channel: ChannelId,
        key: &str,
        value: &str,
    ) -> WorkflowResult<()> {
        let Some(setting) = SettingKey::parse(key) else {
            let known: Vec<&str> = SettingKey::ALL.iter().map(|k| k.as_str()).collect();
            return self
                .services
                .say(
                    channel,
                    format!("Unknown setting `{key}`. Known settings: {}", known.join(", ")),
                )
                .await;
        };
        if value.trim().parse::<u64>().is_err() {
            let what = if setting.is_channel() { "a channel" } else { "a number" };
            return self
                .services
                .say(channel, format!("`{}` must be {what}.", setting.as_str()))
                .await;
        }
        self.services
            .store
            .set_setting(setting.as_str(), value.trim())
            .await?;
        info!(key = setting.as_str(), value, "setting changed");
        self.services
            .say(channel, format!("`{}` set to `{}`.", setting.as_str(), value.trim()))
            .await
    }

    pub(crate) async fn voting_info(&self, channel: ChannelId) -> WorkflowResult<()> {
        let settings = self.services.settings().await?;
        self.services
            .say(
                channel,
                format!(
                    "Voting lasts {} per trial and an idea needs more than `{}` votes.\n\
                     Participants then have {} to send their GitHub username.",
                    describe_window(settings.voting_window.as_secs()),
                    settings.required_votes,
                    describe_window(settings.gathering_window.as_secs()),
                ),
            )
            .await
    }

    pub(crate) async fn list_channels(&self, channel: ChannelId) -> WorkflowResult<()> {
        let settings = self.services.settings().await?;
        let lines: Vec<String> = settings
            .channels()
            .iter()
            .map(|(key, id)| format!("`{}`: <#{id}>", key.as_str()))
            .collect();
        self.services.say(channel, lines.join("\n")).await
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::Coordinator;
    use crate::provisioner::provision;
    use crate::testing::Harness;
    use community::{
        ConfigStore, ContributionWeek, ExternalUsername, Slug, TeamStore, Timestamp,
        UserMembership, UserStore, WarnStore,
    };

    fn slug() -> Slug {
        Slug::parse("idea-board").unwrap()
    }

    // 2024-01-06, a Saturday.
    const SATURDAY: i64 = 1_704_499_200;
    const DAY: i64 = 86_400;

    #[tokio::test]
    async fn manual_teams_wait_for_a_running_workflow() {
        let h = Harness::new().await;
        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");
        let busy = c.reserve(&slug()).unwrap();

        c.create_new_team(channel, "Idea Board").await.unwrap();
        assert_eq!(h.chat.count_calls("create_role"), 0);
        assert!(h.chat.messages(channel)[0].content.contains("try again later"));

        drop(busy);
        c.create_new_team(channel, "Idea Board").await.unwrap();
        assert!(h.store.team(&slug()).await.unwrap().is_some());
        assert!(!c.is_running(&slug()));
    }

    #[tokio::test]
    async fn delete_team_tears_everything_down() {
        let h = Harness::new().await;
        let role = h.chat.add_role("idea-board");
        let member = h.chat.add_member(10);
        h.chat.grant(member, role);
        let team = provision(&h.services, &slug()).await.unwrap();
        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");

        c.delete_team(channel, "idea-board").await.unwrap();

        assert!(h.store.team(&slug()).await.unwrap().is_none());
        assert!(h.source.team_names().is_empty());
        assert_eq!(h.chat.count_calls("delete_category"), 1);
        assert_eq!(h.chat.count_calls("delete_channel"), 3, "general, voice and voting");
        assert!(h.chat.find_role_id("idea-board").is_none());
        assert!(h.chat.find_role_id("pl-idea-board").is_none());
        assert!(h.chat.holders(team.role_id).is_empty());
        assert!(h.chat.messages(h.channels.running).is_empty());
    }

    #[tokio::test]
    async fn privileged_team_roles_are_never_deleted() {
        let h = Harness::new().await;
        let team = provision(&h.services, &slug()).await.unwrap();
        let staff = h.chat.add_role("staff");
        h.chat.make_admin_role(staff);
        let mut record = team.clone();
        record.leader_role_id = staff;
        h.store.save_team(&record).await.unwrap();

        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");
        let err = c.delete_team(channel, "idea-board").await.unwrap_err();
        assert_eq!(err.kind(), community::ErrorKind::PermissionDenied);
        assert!(h.store.team(&slug()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn activity_check_warns_only_the_inactive() {
        let h = Harness::new().await;
        let role = h.chat.add_role("idea-board");
        let busy = h.chat.add_member(10);
        let idle = h.chat.add_member(11);
        h.chat.grant(busy, role);
        h.chat.grant(idle, role);
        let team = provision(&h.services, &slug()).await.unwrap();

        for (member, login, days_ago) in [(busy, "ada", 7), (idle, "linus", 20)] {
            let user = h.source.add_user(login);
            h.store
                .save_membership(&UserMembership {
                    member_id: member,
                    team_slug: slug(),
                    external_username: ExternalUsername::new(login).unwrap(),
                    external_user_id: user.id,
                })
                .await
                .unwrap();
            h.source.add_contribution(
                team.repository_id,
                ContributionWeek {
                    author: user.id,
                    week_start: Timestamp::from_unix_seconds(SATURDAY - days_ago * DAY).unwrap(),
                    commits: 4,
                },
            );
        }

        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");
        let now = Timestamp::from_unix_seconds(SATURDAY + 3_600).unwrap();
        c.activity_check(channel, now).await.unwrap();

        assert_eq!(h.store.warnings(busy).await.unwrap(), 0);
        assert_eq!(h.store.warnings(idle).await.unwrap(), 1);
        let log = h.chat.messages(h.channels.bot);
        assert!(log.iter().any(|m| m.content.ends_with("`idea-board`: active")));
    }

    #[tokio::test]
    async fn activity_check_refuses_weekdays() {
        let h = Harness::new().await;
        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");
        let friday = Timestamp::from_unix_seconds(SATURDAY - DAY).unwrap();

        c.activity_check(channel, friday).await.unwrap();
        assert!(h.chat.messages(channel)[0].content.contains("Saturdays"));
    }

    #[tokio::test]
    async fn settings_are_validated_before_writing() {
        let h = Harness::new().await;
        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");

        c.set_setting(channel, "colour", "red").await.unwrap();
        c.set_setting(channel, "required-votes", "many").await.unwrap();
        c.set_setting(channel, "required-votes", "9").await.unwrap();

        let replies = h.chat.messages(channel);
        assert!(replies[0].content.starts_with("Unknown setting"));
        assert!(replies[1].content.contains("must be a number"));
        assert_eq!(
            h.store.setting("required-votes").await.unwrap().as_deref(),
            Some("9")
        );
    }

    #[tokio::test]
    async fn voting_info_describes_both_windows() {
        let h = Harness::new().await;
        let channel = h.chat.add_text_channel("admin");
        let c = Coordinator::new(h.services.clone(), "!");
        c.voting_info(channel).await.unwrap();
        c.list_channels(channel).await.unwrap();

        let replies = h.chat.messages(channel);
        assert!(replies[0].content.contains("`0` day(s) (`1` hour(s)"));
        assert!(replies[0].content.contains("more than `5` votes"));
        assert!(replies[1].content.contains("`idea-channel`"));
    }
}
