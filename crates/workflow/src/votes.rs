//! Vote Collector.
//!
//! Polls a proposal for up to four trials. Each trial sleeps until the
//! proposal message's anchor plus the voting window, then re-reads the
//! message and its approval reactions. Nothing is cached across the sleep.

use std::collections::HashSet;

use community::{
    remaining_wait, votes_sufficient, ChatError, Embed, Hms, MemberId, Message, MessageId,
    OutgoingMessage, Proposal, Settings, Slug, Timestamp, Trial, UserRef, APPROVAL_EMOJI,
    CELEBRATION_EMOJI,
};
use tracing::{debug, info};

use crate::{mention, Services, WorkflowResult};

/// Result of counting approval reactions on a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Qualifying voters: reactors other than the owner who are still members.
    pub voters: usize,
    /// Owner first (when still a member), then qualifying voters in reaction order.
    pub participants: Vec<UserRef>,
}

/// Counts votes.
///
/// `owner` is the proposing member if they are still in the guild. Reactors
/// are deduplicated; the owner and anyone `is_member` rejects are neither
/// counted nor listed.
pub fn tally(
    owner: Option<UserRef>,
    reactors: &[UserRef],
    is_member: impl Fn(MemberId) -> bool,
) -> Tally {
    let mut seen = HashSet::new();
    let mut participants: Vec<UserRef> = owner.into_iter().collect();
    let mut voters = 0;
    for reactor in reactors {
        if !seen.insert(reactor.id) {
            continue;
        }
        if owner.is_some_and(|o| o.id == reactor.id) || !is_member(reactor.id) {
            continue;
        }
        voters += 1;
        participants.push(*reactor);
    }
    Tally {
        voters,
        participants,
    }
}

/// How a vote ended.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    /// Enough votes. The proposal message is gone and `announcement` (in the
    /// overview channel) anchors the gathering window.
    Approved {
        participants: Vec<UserRef>,
        announcement: Message,
    },
    /// The last trial ended without enough votes. The proposal was deleted.
    Cancelled,
    /// The proposal message disappeared while the task was waiting.
    Abandoned,
}

/// Watches one proposal message until it is approved or cancelled.
pub struct VoteCollector<'a> {
    services: &'a Services,
    slug: Slug,
    message: MessageId,
}

impl<'a> VoteCollector<'a> {
    pub fn new(services: &'a Services, slug: Slug, message: MessageId) -> Self {
        Self {
            services,
            slug,
            message,
        }
    }

    /// Runs from `trial` (0 for a fresh proposal, the stored counter when
    /// resuming) to a final outcome.
    pub async fn run(&self, mut trial: Trial) -> WorkflowResult<VoteOutcome> {
        loop {
            let settings = self.services.settings().await?;
            let Some(proposal) = self.fetch(&settings).await? else {
                return Ok(VoteOutcome::Abandoned);
            };
            let wait = remaining_wait(proposal.anchor(), settings.voting_window, Timestamp::now());
            let hms = wait.partial_day();
            self.services
                .say(
                    settings.overview_channel,
                    format!(
                        "`{}` day(s), `{}` hour(s), `{}` minute(s) and `{}` second(s) are remaining \
                         till voting ends on the `{}` idea.",
                        wait.days, hms.hours, hms.minutes, hms.seconds, self.slug
                    ),
                )
                .await?;
            debug!(slug = %self.slug, %trial, seconds = wait.total_seconds(), "waiting for votes");
            tokio::time::sleep(wait.as_duration()).await;

            let settings = self.services.settings().await?;
            let Some(proposal) = self.fetch(&settings).await? else {
                return Ok(VoteOutcome::Abandoned);
            };
            let counted = self.count(&proposal).await?;
            info!(
                slug = %self.slug,
                %trial,
                voters = counted.voters,
                required = settings.required_votes,
                "trial ended"
            );

            if votes_sufficient(counted.voters, settings.required_votes) {
                let announcement = self.approve(&settings, &counted).await?;
                return Ok(VoteOutcome::Approved {
                    participants: counted.participants,
                    announcement,
                });
            }

            match trial.next() {
                Some(next) => {
                    self.services
                        .say(
                            settings.overview_channel,
                            format!(
                                "Votes for `{}` were not enough, waiting for more votes...",
                                self.slug
                            ),
                        )
                        .await?;
                    let Some(embed) = Proposal::embed_with_trial(&proposal, next) else {
                        return Ok(VoteOutcome::Abandoned);
                    };
                    match self
                        .services
                        .chat
                        .edit_embed(settings.idea_channel, self.message, embed)
                        .await
                    {
                        Ok(_) => {}
                        Err(err) if err.is_not_found() => return Ok(VoteOutcome::Abandoned),
                        Err(err) => return Err(err.into()),
                    }
                    trial = next;
                }
                None => {
                    self.services
                        .say(
                            settings.overview_channel,
                            format!(
                                "The `{}` idea has been cancelled due to lack of interest :(",
                                self.slug
                            ),
                        )
                        .await?;
                    self.delete_proposal(&settings).await?;
                    return Ok(VoteOutcome::Cancelled);
                }
            }
        }
    }

    async fn fetch(&self, settings: &Settings) -> WorkflowResult<Option<Message>> {
        match self
            .services
            .chat
            .fetch_message(settings.idea_channel, self.message)
            .await
        {
            Ok(message) => Ok(Some(message)),
            Err(err) if err.is_not_found() => {
                info!(slug = %self.slug, "proposal message is gone, abandoning vote");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn count(&self, proposal: &Message) -> WorkflowResult<Tally> {
        let chat = &self.services.chat;
        let owner = match proposal.mentions.first() {
            Some(owner) => chat.member(owner.id).await?.map(|m| m.as_user()),
            None => None,
        };
        let reactors = chat
            .reaction_users(proposal.channel_id, proposal.id, APPROVAL_EMOJI)
            .await?;

        let mut members = HashSet::new();
        for reactor in &reactors {
            if chat.member(reactor.id).await?.is_some() {
                members.insert(reactor.id);
            }
        }
        Ok(tally(owner, &reactors, |id| members.contains(&id)))
    }

    async fn approve(&self, settings: &Settings, counted: &Tally) -> WorkflowResult<Message> {
        self.delete_proposal(settings).await?;
        let participants: Vec<String> = counted.participants.iter().map(|p| mention(p.id)).collect();
        let content = format!(
            "{}\n\nVoting for {} has ended, **approved**!\nParticipants:\n{}\n\
             Please check your messages, the team will be created if a sufficient number of \
             voters reply to the DM with their GitHub usernames.",
            CELEBRATION_EMOJI.repeat(counted.voters),
            self.slug,
            participants.join("\n"),
        );
        let announcement = self
            .services
            .chat
            .send_message(
                settings.overview_channel,
                OutgoingMessage::with_embed(content, Embed::titled(self.slug.as_str())),
            )
            .await?;
        Ok(announcement)
    }

    async fn delete_proposal(&self, settings: &Settings) -> WorkflowResult<()> {
        match self
            .services
            .chat
            .delete_message(settings.idea_channel, self.message)
            .await
        {
            Ok(()) => Ok(()),
            Err(ChatError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Formats a window as days plus an hour/minute/second breakdown.
pub fn describe_window(seconds: u64) -> String {
    let hms = Hms::from_seconds(seconds);
    format!(
        "`{}` day(s) (`{}` hour(s), `{}` minute(s) and `{}` second(s))",
        seconds / 86_400,
        hms.hours,
        hms.minutes,
        hms.seconds
    )
}
