//! Reply routing for interactive prompts.
//!
//! A task that asks a member a question registers a waiter keyed by channel
//! and member. The event loop offers every incoming message to the router
//! first; a matching waiter consumes it. Waits are bounded and fail closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use community::{ChannelId, MemberId};
use tokio::sync::oneshot;

/// Per-field wait during proposal submission.
pub const FIELD_TIMEOUT: Duration = Duration::from_secs(75);

/// Wait for `a: yes` when re-joining a team with an unchanged identity.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(20);

type Accept = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct Waiter {
    id: u64,
    channel: ChannelId,
    member: MemberId,
    accept: Accept,
    reply: oneshot::Sender<String>,
}

#[derive(Default)]
pub struct ReplyRouter {
    next_id: AtomicU64,
    waiters: Mutex<Vec<Waiter>>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiters(&self) -> MutexGuard<'_, Vec<Waiter>> {
        self.waiters.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Waits up to `timeout` for a message from `member` in `channel` that
    /// `accept` approves. `None` on timeout.
    pub async fn wait_for(
        &self,
        channel: ChannelId,
        member: MemberId,
        timeout: Duration,
        accept: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters().push(Waiter {
            id,
            channel,
            member,
            accept: Box::new(accept),
            reply: tx,
        });

        let reply = tokio::time::timeout(timeout, rx).await;
        self.waiters().retain(|w| w.id != id);
        match reply {
            Ok(Ok(content)) => Some(content),
            _ => None,
        }
    }

    /// Hands `content` to the oldest matching waiter. Returns `true` when the
    /// message was consumed.
    pub fn offer(&self, channel: ChannelId, member: MemberId, content: &str) -> bool {
        let mut waiters = self.waiters();
        let Some(index) = waiters
            .iter()
            .position(|w| w.channel == channel && w.member == member && (w.accept)(content))
        else {
            return false;
        };
        let waiter = waiters.remove(index);
        waiter.reply.send(content.to_string()).is_ok()
    }
}

/// Accepts `p: <text>` with non-empty text.
pub fn is_field_reply(content: &str) -> bool {
    field_value(content).is_some()
}

/// The text after a `p:` prefix, trimmed.
pub fn field_value(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let prefix = trimmed.get(..2)?;
    if !prefix.eq_ignore_ascii_case("p:") {
        return None;
    }
    let value = trimmed[2..].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `true` when `content` reads `<tag>: yes`, ignoring case and spaces.
pub fn is_confirmation(tag: char, content: &str) -> bool {
    let compact: String = content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    compact == format!("{tag}:yes")
}
