//! Warning and removal escalation.

use community::{MemberId, WARNINGS_BEFORE_REMOVAL};
use tracing::{info, warn as log_warn};

use crate::{mention, Services, WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// The member holds administrator privileges, or ranks above the bot, and
    /// was left alone.
    Refused,
}

/// Records a warning, announces it in the bot channel and DMs the member.
/// Reaching [`WARNINGS_BEFORE_REMOVAL`] removes the member. Returns the new
/// warning count.
pub async fn warn(services: &Services, member: MemberId, reason: &str) -> WorkflowResult<u32> {
    let count = services.store.add_warning(member).await?;
    let settings = services.settings().await?;
    services
        .say(
            settings.bot_channel,
            format!("{} has been warned.\nReason: `{reason}`", mention(member)),
        )
        .await?;
    services
        .tell(member, format!("You have been warned.\nReason: `{reason}`"))
        .await?;
    info!(%member, count, "member warned");

    if count >= WARNINGS_BEFORE_REMOVAL {
        remove(
            services,
            member,
            &format!("Reaching {WARNINGS_BEFORE_REMOVAL} or more warnings"),
        )
        .await?;
    }
    Ok(count)
}

/// Kicks `member` unless they are an administrator, clearing their warnings.
/// The member is told why before the kick; a refused DM does not stop it. A
/// kick the platform refuses is reported in the bot channel and the warnings
/// are kept.
pub async fn remove(
    services: &Services,
    member: MemberId,
    reason: &str,
) -> WorkflowResult<RemovalOutcome> {
    let settings = services.settings().await?;
    let Some(target) = services.chat.member(member).await? else {
        return Err(WorkflowError::not_found(format!("member {member}")));
    };
    if target.administrator {
        log_warn!(%member, "refusing to remove an administrator");
        services
            .say(settings.bot_channel, format!("Could not kick {}", mention(member)))
            .await?;
        return Ok(RemovalOutcome::Refused);
    }

    services
        .tell(
            member,
            format!("You have been kicked from our server.\nReason: `{reason}`"),
        )
        .await?;
    match services.chat.kick(member, reason).await {
        Ok(()) => {}
        Err(err) if err.is_forbidden() => {
            log_warn!(%member, error = %err, "kick refused by the platform");
            services
                .say(settings.bot_channel, format!("Could not kick {}", mention(member)))
                .await?;
            return Ok(RemovalOutcome::Refused);
        }
        Err(err) => return Err(err.into()),
    }
    services.store.clear_warnings(member).await?;
    services
        .say(
            settings.bot_channel,
            format!("{} has been kicked.\nReason: `{reason}`", mention(member)),
        )
        .await?;
    info!(%member, "member removed");
    Ok(RemovalOutcome::Removed)
}
