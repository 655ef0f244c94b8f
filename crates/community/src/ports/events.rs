//! Inbound chat events and the port that produces them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, MemberId, MessageId};

/// An event delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The platform session is established.
    Ready,

    /// A reaction was added to a message.
    ReactionAdded {
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: String,
        member_id: MemberId,
        #[serde(default)]
        member_is_bot: bool,
    },

    /// A message was posted in a guild channel or a DM channel.
    MessageCreated {
        channel_id: ChannelId,
        message_id: MessageId,
        author_id: MemberId,
        #[serde(default)]
        author_is_bot: bool,
        /// `true` when posted in a one-to-one DM channel with the bot.
        #[serde(default)]
        direct: bool,
        content: String,
    },
}

/// A stream of [`ChatEvent`]s.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event. `None` once the source is closed.
    async fn next_event(&mut self) -> Option<ChatEvent>;
}
