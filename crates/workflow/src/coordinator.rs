//! Workflow Coordinator.
//!
//! Turns chat events into workflow steps. Long-running work (a vote followed
//! by its gathering window, an interactive command) runs in its own task so
//! the event loop keeps delivering replies and reactions while it waits.
//!
//! In-flight workflows are never persisted. After a restart they are rebuilt
//! from the markers they left in the idea and overview channels: startup
//! flags every marker with the restart reaction and the reaction resumes it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use community::{
    ChannelId, ChatEvent, Command, ErrorKind, Marker, MarkerKind, MemberId, MessageId, Settings,
    Slug, TaskId, Trial, APPROVAL_EMOJI, RESTART_EMOJI,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::gathering::{self, GatheringOutcome};
use crate::markers::pending_markers;
use crate::prompts::ReplyRouter;
use crate::votes::{VoteCollector, VoteOutcome};
use crate::{mention, Services, WorkflowError, WorkflowResult};

/// A workflow recovered from a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumableTask {
    /// A proposal still under vote.
    Vote {
        slug: Slug,
        message: MessageId,
        trial: Trial,
    },
    /// An approval announcement whose gathering window may still be open.
    Gathering { slug: Slug, message: MessageId },
}

impl ResumableTask {
    pub fn from_marker(marker: Marker) -> Option<Self> {
        match marker {
            Marker::Proposal {
                message,
                slug,
                trial,
                ..
            } => Some(Self::Vote {
                slug,
                message,
                trial,
            }),
            Marker::Gathering { message, slug, .. } => Some(Self::Gathering { slug, message }),
            Marker::Solicitation { .. } | Marker::Running { .. } => None,
        }
    }

    pub fn slug(&self) -> &Slug {
        match self {
            Self::Vote { slug, .. } | Self::Gathering { slug, .. } => slug,
        }
    }

    pub fn message(&self) -> MessageId {
        match self {
            Self::Vote { message, .. } | Self::Gathering { message, .. } => *message,
        }
    }

    /// The channel holding the marker.
    pub fn channel(&self, settings: &Settings) -> ChannelId {
        match self {
            Self::Vote { .. } => settings.idea_channel,
            Self::Gathering { .. } => settings.overview_channel,
        }
    }
}

/// Dispatches chat events and owns the set of running workflow tasks.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) services: Services,
    pub(crate) prompts: Arc<ReplyRouter>,
    running: Arc<Mutex<HashSet<Slug>>>,
    pub(crate) cooldowns: Arc<Mutex<HashMap<MemberId, Instant>>>,
    prefix: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Releases a slug when its holder finishes, however it finishes.
pub(crate) struct Lease {
    running: Arc<Mutex<HashSet<Slug>>>,
    slug: Slug,
}

impl Lease {
    pub(crate) fn slug(&self) -> &Slug {
        &self.slug
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.slug);
    }
}

impl Coordinator {
    pub fn new(services: Services, prefix: impl Into<String>) -> Self {
        Self {
            services,
            prompts: Arc::new(ReplyRouter::new()),
            running: Arc::new(Mutex::new(HashSet::new())),
            cooldowns: Arc::new(Mutex::new(HashMap::new())),
            prefix: prefix.into(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// `true` while a workflow task holds `slug`.
    pub fn is_running(&self, slug: &Slug) -> bool {
        lock(&self.running).contains(slug)
    }

    // -- dispatch ------------------------------------------------------------

    /// Routes one event. Prompt replies are consumed synchronously so they
    /// can never race the command that asked for them; everything else runs
    /// on a spawned task whose handle is returned.
    pub fn dispatch(&self, event: ChatEvent) -> Option<JoinHandle<()>> {
        match event {
            ChatEvent::Ready => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    match this.recover().await {
                        Ok(flagged) => info!(flagged, "restart markers flagged"),
                        Err(err) => error!(error = %err, "recovery scan failed"),
                    }
                }))
            }
            ChatEvent::ReactionAdded {
                channel_id,
                message_id,
                emoji,
                member_id,
                member_is_bot,
            } => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    if let Err(err) = this
                        .on_reaction(channel_id, message_id, &emoji, member_id, member_is_bot)
                        .await
                    {
                        warn!(error = %err, %message_id, "reaction handling failed");
                    }
                }))
            }
            ChatEvent::MessageCreated {
                channel_id,
                author_id,
                author_is_bot,
                direct,
                content,
                ..
            } => {
                if author_is_bot {
                    return None;
                }
                if self.prompts.offer(channel_id, author_id, &content) {
                    debug!(%channel_id, member = %author_id, "prompt reply consumed");
                    return None;
                }
                let this = self.clone();
                match Command::parse(&self.prefix, &content) {
                    Some(Ok(command)) => Some(tokio::spawn(async move {
                        this.run_command(command, author_id, channel_id).await;
                    })),
                    Some(Err(err)) => Some(tokio::spawn(async move {
                        let text = format!("{}, {err}", mention(author_id));
                        if let Err(err) = this.services.say(channel_id, text).await {
                            warn!(error = %err, "could not report a parse error");
                        }
                    })),
                    None => Some(tokio::spawn(async move {
                        if let Err(err) = this
                            .submit_identity(channel_id, author_id, direct, content.trim())
                            .await
                        {
                            this.report(channel_id, &err).await;
                        }
                    })),
                }
            }
        }
    }

    async fn on_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
        member_is_bot: bool,
    ) -> WorkflowResult<()> {
        let settings = self.services.settings().await?;
        let kind = if channel == settings.idea_channel {
            MarkerKind::Proposal
        } else if channel == settings.overview_channel {
            MarkerKind::Gathering
        } else {
            return Ok(());
        };
        if emoji == APPROVAL_EMOJI {
            return Ok(());
        }

        let chat = &self.services.chat;
        let fetched = match chat.fetch_message(channel, message).await {
            Ok(fetched) => fetched,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if !fetched.author.bot || fetched.embeds.is_empty() {
            return Ok(());
        }

        if emoji == RESTART_EMOJI && self.may_restart(member, member_is_bot).await? {
            chat.remove_reaction(channel, message, emoji, member).await?;
            match Marker::read(kind, &fetched).and_then(ResumableTask::from_marker) {
                Some(task) => {
                    self.resume(task);
                }
                None => debug!(%message, "restart requested on a message that is not a marker"),
            }
            return Ok(());
        }
        chat.remove_reaction(channel, message, emoji, member).await?;
        Ok(())
    }

    async fn may_restart(&self, member: MemberId, member_is_bot: bool) -> WorkflowResult<bool> {
        if member_is_bot {
            return Ok(true);
        }
        Ok(self
            .services
            .chat
            .member(member)
            .await?
            .is_some_and(|m| m.administrator))
    }

    // -- recovery ------------------------------------------------------------

    /// Every workflow marker in the idea and overview channels.
    pub async fn pending_tasks(&self) -> WorkflowResult<Vec<ResumableTask>> {
        let settings = self.services.settings().await?;
        let chat = &*self.services.chat;
        let mut tasks = Vec::new();
        for (channel, kind) in [
            (settings.idea_channel, MarkerKind::Proposal),
            (settings.overview_channel, MarkerKind::Gathering),
        ] {
            tasks.extend(
                pending_markers(chat, channel, kind)
                    .await?
                    .into_iter()
                    .filter_map(|(_, marker)| ResumableTask::from_marker(marker)),
            );
        }
        Ok(tasks)
    }

    /// Flags every pending marker with the restart reaction. Returns how many
    /// were flagged.
    pub async fn recover(&self) -> WorkflowResult<usize> {
        let settings = self.services.settings().await?;
        let tasks = self.pending_tasks().await?;
        for task in &tasks {
            self.services
                .chat
                .add_reaction(task.channel(&settings), task.message(), RESTART_EMOJI)
                .await?;
        }
        Ok(tasks.len())
    }

    /// Starts a recovered task unless its slug is already running.
    pub fn resume(&self, task: ResumableTask) -> Option<JoinHandle<()>> {
        match task {
            ResumableTask::Vote {
                slug,
                message,
                trial,
            } => self.start_vote(slug, message, trial),
            ResumableTask::Gathering { slug, message } => {
                let services = self.services.clone();
                let task_slug = slug.clone();
                self.spawn_task(slug, "gathering", async move {
                    let outcome = gathering::resume(&services, &task_slug, message).await?;
                    log_gathering(&task_slug, &outcome);
                    Ok(())
                })
            }
        }
    }

    /// Claims `slug` for one workflow. `None` while something else holds it.
    pub(crate) fn reserve(&self, slug: &Slug) -> Option<Lease> {
        if !lock(&self.running).insert(slug.clone()) {
            return None;
        }
        Some(Lease {
            running: Arc::clone(&self.running),
            slug: slug.clone(),
        })
    }

    /// Watches a proposal from `trial` and, on approval, runs its gathering
    /// window.
    pub fn start_vote(&self, slug: Slug, message: MessageId, trial: Trial) -> Option<JoinHandle<()>> {
        let Some(lease) = self.reserve(&slug) else {
            debug!(%slug, "vote already running");
            return None;
        };
        Some(self.run_vote(lease, message, trial))
    }

    /// Starts the vote under a lease the caller already holds.
    pub(crate) fn run_vote(&self, lease: Lease, message: MessageId, trial: Trial) -> JoinHandle<()> {
        let services = self.services.clone();
        let task_slug = lease.slug().clone();
        self.spawn_leased(lease, "vote", async move {
            let outcome = VoteCollector::new(&services, task_slug.clone(), message)
                .run(trial)
                .await?;
            match outcome {
                VoteOutcome::Approved {
                    participants,
                    announcement,
                } => {
                    let outcome =
                        gathering::gather(&services, &task_slug, announcement.id, &participants)
                            .await?;
                    log_gathering(&task_slug, &outcome);
                }
                VoteOutcome::Cancelled => info!(slug = %task_slug, "proposal cancelled"),
                VoteOutcome::Abandoned => info!(slug = %task_slug, "proposal abandoned"),
            }
            Ok(())
        })
    }

    fn spawn_task<F>(&self, slug: Slug, kind: &'static str, work: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = WorkflowResult<()>> + Send + 'static,
    {
        let Some(lease) = self.reserve(&slug) else {
            debug!(%slug, kind, "task already running");
            return None;
        };
        Some(self.spawn_leased(lease, kind, work))
    }

    fn spawn_leased<F>(&self, lease: Lease, kind: &'static str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = WorkflowResult<()>> + Send + 'static,
    {
        let span = info_span!("task", kind, slug = %lease.slug, task_id = %TaskId::new_random());
        let this = self.clone();
        tokio::spawn(
            async move {
                let _lease = lease;
                info!("task started");
                if let Err(err) = work.await {
                    this.report_in_overview(&err).await;
                }
            }
            .instrument(span),
        )
    }

    // -- failure reporting ----------------------------------------------------

    /// Reports a failed step in `channel` according to its kind.
    pub(crate) async fn report(&self, channel: ChannelId, err: &WorkflowError) {
        let text = match err.kind() {
            ErrorKind::NotFound => format!("Error: {err}"),
            ErrorKind::PermissionDenied => format!("I am not allowed to do that: {err}"),
            ErrorKind::Timeout => format!("Cancelled: {err}"),
            ErrorKind::InvalidInput => format!("Invalid input: {err}"),
            ErrorKind::Unexpected => {
                error!(error = %err, "unexpected failure");
                "Something went wrong, please contact an administrator.".to_string()
            }
        };
        if let Err(send) = self.services.say(channel, text).await {
            warn!(error = %send, original = %err, "could not report a failure");
        }
    }

    async fn report_in_overview(&self, err: &WorkflowError) {
        match self.services.settings().await {
            Ok(settings) => self.report(settings.overview_channel, err).await,
            Err(load) => error!(error = %err, settings = %load, "task failed"),
        }
    }

    // -- commands --------------------------------------------------------------

    async fn run_command(&self, command: Command, invoker: MemberId, channel: ChannelId) {
        let span = info_span!("command", ?command, member = %invoker);
        let result = async {
            if command.requires_admin() && !self.is_admin(invoker).await? {
                self.services
                    .say(
                        channel,
                        format!(
                            "{}, you need administrator permissions for this command.",
                            mention(invoker)
                        ),
                    )
                    .await?;
                return Ok(());
            }
            self.execute(command.clone(), invoker, channel).await
        }
        .instrument(span)
        .await;

        if let Err(err) = result {
            if matches!(command, Command::NewIdea) && err.kind() == ErrorKind::Unexpected {
                self.report_in_overview(&err).await;
            } else {
                self.report(channel, &err).await;
            }
        }
    }

    async fn execute(
        &self,
        command: Command,
        invoker: MemberId,
        channel: ChannelId,
    ) -> WorkflowResult<()> {
        match command {
            Command::NewIdea => self.new_idea(invoker, channel).await,
            Command::AddMe { username, team } => self.add_me(invoker, channel, &username, &team).await,
            Command::RemoveMe { team } => self.remove_me(invoker, channel, &team).await,
            Command::StartLeaderVoting { team } => self.start_leader_voting(channel, &team).await,
            Command::CreateNewTeam { title } => self.create_new_team(channel, &title).await,
            Command::DeleteTeam { team } => self.delete_team(channel, &team).await,
            Command::ActivityCheck => {
                self.activity_check(channel, community::Timestamp::now())
                    .await
            }
            Command::SetSetting { key, value } => self.set_setting(channel, &key, &value).await,
            Command::Warn { member, reason } => {
                crate::discipline::warn(&self.services, member, &reason).await?;
                Ok(())
            }
            Command::Remove { member, reason } => {
                crate::discipline::remove(&self.services, member, &reason).await?;
                Ok(())
            }
            Command::VotingInfo => self.voting_info(channel).await,
            Command::Channels => self.list_channels(channel).await,
        }
    }

    async fn is_admin(&self, member: MemberId) -> WorkflowResult<bool> {
        Ok(self
            .services
            .chat
            .member(member)
            .await?
            .is_some_and(|m| m.administrator))
    }
}

fn log_gathering(slug: &Slug, outcome: &GatheringOutcome) {
    match outcome {
        GatheringOutcome::Approved(team) => info!(%slug, role = %team.role_id, "team provisioned"),
        GatheringOutcome::Cancelled => info!(%slug, "gathering cancelled"),
        GatheringOutcome::RoleVanished => warn!(%slug, "gathering aborted, role vanished"),
        GatheringOutcome::Abandoned => info!(%slug, "gathering abandoned"),
    }
}
