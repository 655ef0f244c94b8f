//! The ports every workflow step works against.

use std::sync::Arc;

use community::{
    ChannelId, ChatError, ChatPlatform, GuildId, MemberId, OutgoingMessage, Settings, SourceHost,
    Store, Timestamp,
};

use crate::WorkflowResult;

/// Shared handles to the chat platform, the source host and the store, plus
/// the process facts recovery needs.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatPlatform>,
    pub source: Arc<dyn SourceHost>,
    pub store: Arc<dyn Store>,
    /// The guild this deployment manages.
    pub guild: GuildId,
    /// When this process came online. Bot messages older than this belong to
    /// a previous run.
    pub online_since: Timestamp,
}

impl Services {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        source: Arc<dyn SourceHost>,
        store: Arc<dyn Store>,
        guild: GuildId,
        online_since: Timestamp,
    ) -> Self {
        Self {
            chat,
            source,
            store,
            guild,
            online_since,
        }
    }

    /// Reads the Config store. Called again after every suspension.
    pub async fn settings(&self) -> WorkflowResult<Settings> {
        Ok(Settings::load(&*self.store).await?)
    }

    /// Posts a plain-text message.
    pub async fn say(&self, channel: ChannelId, text: impl Into<String>) -> WorkflowResult<()> {
        self.chat
            .send_message(channel, OutgoingMessage::text(text))
            .await?;
        Ok(())
    }

    /// Sends a DM, ignoring members who do not accept DMs from the bot.
    pub async fn tell(&self, member: MemberId, text: impl Into<String>) -> WorkflowResult<()> {
        match self
            .chat
            .send_direct(member, OutgoingMessage::text(text))
            .await
        {
            Ok(_) => Ok(()),
            Err(ChatError::Forbidden { reason }) => {
                tracing::debug!(%member, %reason, "direct message refused");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// `<@id>` for a member.
pub fn mention(member: MemberId) -> String {
    format!("<@{member}>")
}
