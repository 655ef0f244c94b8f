//! Interactive proposal submission.

use std::time::Duration;

use community::{
    sanitize_field, ChannelId, MarkerKind, MemberId, OutgoingMessage, ProposalDraft, Slug,
    Trial, APPROVAL_EMOJI,
};
use tokio::time::Instant;
use tracing::info;

use crate::coordinator::{Coordinator, Lease};
use crate::markers::find_pending_marker;
use crate::prompts::{field_value, is_confirmation, is_field_reply, FIELD_TIMEOUT};
use crate::{mention, WorkflowResult};

/// Minimum time between two submissions by the same member.
pub const SUBMISSION_COOLDOWN: Duration = Duration::from_secs(300);

impl Coordinator {
    /// Walks `invoker` through title, explanation and language, shows a
    /// preview and posts the proposal once confirmed.
    pub(crate) async fn new_idea(&self, invoker: MemberId, channel: ChannelId) -> WorkflowResult<()> {
        if let Some(left) = self.cooldown_left(invoker) {
            self.services
                .say(
                    channel,
                    format!(
                        "{}, you can submit another idea in `{}` seconds.",
                        mention(invoker),
                        left.as_secs()
                    ),
                )
                .await?;
            return Ok(());
        }

        let Some(lease) = self.ask_title(invoker, channel).await? else {
            return Ok(());
        };
        let Some(explanation) = self
            .ask_text(invoker, channel, "Please explain your idea.")
            .await?
        else {
            return Ok(());
        };
        let Some(language) = self
            .ask_text(invoker, channel, "Which programming language will it use?")
            .await?
        else {
            return Ok(());
        };

        let slug = lease.slug().clone();
        self.services.store.delete_memberships_for_team(&slug).await?;
        let draft = ProposalDraft::new(slug, &explanation, &language);

        let chat = &self.services.chat;
        let preview = chat
            .send_message(
                channel,
                OutgoingMessage::with_embed(
                    format!(
                        "{}, is this correct? Reply `p: yes` to post it.",
                        mention(invoker)
                    ),
                    draft.preview_embed(),
                ),
            )
            .await?;
        let confirmed = self
            .prompts
            .wait_for(channel, invoker, FIELD_TIMEOUT, |c| is_confirmation('p', c))
            .await;
        match chat.delete_message(channel, preview.id).await {
            Err(err) if !err.is_not_found() => return Err(err.into()),
            _ => {}
        }
        if confirmed.is_none() {
            self.services
                .say(channel, format!("{}, your idea was cancelled.", mention(invoker)))
                .await?;
            return Ok(());
        }

        let settings = self.services.settings().await?;
        let posted = chat
            .send_message(
                settings.idea_channel,
                OutgoingMessage::with_embed(
                    format!("{} proposed an idea", mention(invoker)),
                    draft.posting_embed(),
                ),
            )
            .await?;
        chat.add_reaction(settings.idea_channel, posted.id, APPROVAL_EMOJI)
            .await?;
        info!(slug = %draft.slug, member = %invoker, "proposal posted");
        self.services
            .say(channel, format!("{}, your idea has been posted!", mention(invoker)))
            .await?;

        lock_cooldowns(self).insert(invoker, Instant::now());
        self.run_vote(lease, posted.id, Trial::FIRST);
        Ok(())
    }

    fn cooldown_left(&self, member: MemberId) -> Option<Duration> {
        let last = *lock_cooldowns(self).get(&member)?;
        SUBMISSION_COOLDOWN.checked_sub(last.elapsed())
    }

    /// Prompts until the title yields a slug that is free, and reserves it
    /// for the rest of the submission. `None` when the member stops answering.
    async fn ask_title(
        &self,
        invoker: MemberId,
        channel: ChannelId,
    ) -> WorkflowResult<Option<Lease>> {
        let mut question = "What is the title of your idea?";
        loop {
            let Some(title) = self.ask(invoker, channel, question).await? else {
                return Ok(None);
            };
            question = "Please choose another title.";
            let slug = match Slug::derive(&title) {
                Ok(slug) => slug,
                Err(err) => {
                    self.services.say(channel, format!("Invalid title: {err}")).await?;
                    continue;
                }
            };
            if self.services.store.team(&slug).await?.is_some() {
                self.services
                    .say(channel, format!("A team called `{slug}` already exists."))
                    .await?;
                continue;
            }
            let settings = self.services.settings().await?;
            let live = find_pending_marker(
                &*self.services.chat,
                settings.idea_channel,
                &slug,
                MarkerKind::Proposal,
            )
            .await?;
            let lease = match live {
                Some(_) => None,
                None => self.reserve(&slug),
            };
            match lease {
                Some(lease) => return Ok(Some(lease)),
                None => {
                    self.services
                        .say(
                            channel,
                            format!("An idea called `{slug}` is already being submitted or voted on."),
                        )
                        .await?;
                }
            }
        }
    }

    /// Asks for a free-text proposal field until the answer still has text
    /// once [`sanitize_field`] has stripped it.
    async fn ask_text(
        &self,
        invoker: MemberId,
        channel: ChannelId,
        question: &str,
    ) -> WorkflowResult<Option<String>> {
        loop {
            let Some(value) = self.ask(invoker, channel, question).await? else {
                return Ok(None);
            };
            if !sanitize_field(&value).is_empty() {
                return Ok(Some(value));
            }
            self.services
                .say(
                    channel,
                    format!(
                        "{}, formatting characters are removed, so that answer is empty.",
                        mention(invoker)
                    ),
                )
                .await?;
        }
    }

    /// Asks one `p:` question. `None` after [`FIELD_TIMEOUT`] without a reply.
    async fn ask(
        &self,
        invoker: MemberId,
        channel: ChannelId,
        question: &str,
    ) -> WorkflowResult<Option<String>> {
        self.services
            .say(
                channel,
                format!("{}, {question} Reply with `p: <answer>`.", mention(invoker)),
            )
            .await?;
        let reply = self
            .prompts
            .wait_for(channel, invoker, FIELD_TIMEOUT, is_field_reply)
            .await;
        match reply.as_deref().and_then(field_value) {
            Some(value) => Ok(Some(value)),
            None => {
                self.services
                    .say(
                        channel,
                        format!("{}, cancelled for not responding.", mention(invoker)),
                    )
                    .await?;
                Ok(None)
            }
        }
    }
}

fn lock_cooldowns(
    coordinator: &Coordinator,
) -> std::sync::MutexGuard<'_, std::collections::HashMap<MemberId, Instant>> {
    coordinator
        .cooldowns
        .lock()
        .unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use crate::coordinator::{Coordinator, Lease};
    use crate::testing::{Harness, BOT_ID};
    use community::{ChannelId, ChatEvent, MemberId, MessageId, Proposal, Slug, APPROVAL_EMOJI};
    use std::time::Duration;

    fn said(channel: ChannelId, author: MemberId, content: &str) -> ChatEvent {
        ChatEvent::MessageCreated {
            channel_id: channel,
            message_id: MessageId::new(1),
            author_id: author,
            author_is_bot: false,
            direct: false,
            content: content.to_string(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_proposal_is_posted_and_voted_on() {
        let h = Harness::new().await;
        let owner = h.chat.add_member(100);
        let channel = h.chat.add_text_channel("general");
        let c = Coordinator::new(h.services.clone(), "!");

        let flow = c.dispatch(said(channel, owner, "!new_idea")).unwrap();
        for reply in [
            "p: Idea Board!",
            "p: A *board* for `ideas`",
            "p: Rust",
            "p: yes",
        ] {
            settle().await;
            assert!(c.dispatch(said(channel, owner, reply)).is_none(), "{reply} consumed");
        }
        flow.await.unwrap();

        let posted = h.chat.messages(h.channels.idea);
        assert_eq!(posted.len(), 1);
        let proposal = Proposal::from_message(&posted[0]).unwrap();
        assert_eq!(proposal.slug.as_str(), "idea-board");
        assert_eq!(proposal.explanation, "A board for ideas");
        assert_eq!(proposal.owner, Some(owner));
        assert_eq!(h.chat.reactors(posted[0].id, APPROVAL_EMOJI), vec![BOT_ID]);
        assert!(h.chat.messages(channel).iter().all(|m| m.embeds.is_empty()), "preview deleted");
        assert!(c.is_running(&proposal.slug));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_cancels_the_submission() {
        let h = Harness::new().await;
        let owner = h.chat.add_member(100);
        let channel = h.chat.add_text_channel("general");
        let c = Coordinator::new(h.services.clone(), "!");

        c.dispatch(said(channel, owner, "!new_idea"))
            .unwrap()
            .await
            .unwrap();

        assert!(h.chat.messages(h.channels.idea).is_empty());
        let last = h.chat.messages(channel).pop().unwrap();
        assert!(last.content.contains("cancelled for not responding"));
    }

    #[tokio::test(start_paused = true)]
    async fn a_title_being_submitted_is_reserved() {
        let h = Harness::new().await;
        let first = h.chat.add_member(100);
        let second = h.chat.add_member(101);
        let channel = h.chat.add_text_channel("general");
        let c = Coordinator::new(h.services.clone(), "!");
        let slug = Slug::parse("idea-board").unwrap();

        let a = c.dispatch(said(channel, first, "!new_idea")).unwrap();
        settle().await;
        c.dispatch(said(channel, first, "p: Idea Board"));
        settle().await;
        assert!(c.is_running(&slug));

        let b = c.dispatch(said(channel, second, "!new_idea")).unwrap();
        settle().await;
        c.dispatch(said(channel, second, "p: idea board"));
        settle().await;
        assert!(h
            .chat
            .messages(channel)
            .iter()
            .any(|m| m.content.contains("`idea-board` is already being submitted")));

        a.abort();
        b.abort();
        settle().await;
        assert!(!c.is_running(&slug), "an abandoned submission releases its title");
    }

    #[tokio::test(start_paused = true)]
    async fn answers_made_only_of_formatting_are_asked_again() {
        let h = Harness::new().await;
        let owner = h.chat.add_member(100);
        let channel = h.chat.add_text_channel("general");
        let c = Coordinator::new(h.services.clone(), "!");

        let flow = c.dispatch(said(channel, owner, "!new_idea")).unwrap();
        for reply in [
            "p: Idea Board",
            "p: ***",
            "p: A board for ideas",
            "p: `_`",
            "p: Rust",
            "p: yes",
        ] {
            settle().await;
            assert!(c.dispatch(said(channel, owner, reply)).is_none(), "{reply} consumed");
        }
        flow.await.unwrap();

        let rejected = h
            .chat
            .messages(channel)
            .iter()
            .filter(|m| m.content.contains("that answer is empty"))
            .count();
        assert_eq!(rejected, 2);
        let posted = h.chat.messages(h.channels.idea);
        let proposal = Proposal::from_message(&posted[0]).unwrap();
        assert_eq!(proposal.explanation, "A board for ideas");
        assert_eq!(proposal.language, "Rust");
    }

    #[tokio::test(start_paused = true)]
    async fn taken_titles_are_asked_again() {
        let h = Harness::new().await;
        let owner = h.chat.add_member(100);
        let channel = h.chat.add_text_channel("general");
        let c = Coordinator::new(h.services.clone(), "!");

        let flow = c.dispatch(said(channel, owner, "!new_idea")).unwrap();
        settle().await;
        c.dispatch(said(channel, owner, "p: 1234"));
        settle().await;
        assert!(h
            .chat
            .messages(channel)
            .iter()
            .any(|m| m.content.starts_with("Invalid title")));
        flow.abort();
    }
}
