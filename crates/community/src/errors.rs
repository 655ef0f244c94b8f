//! Top-level error types for the community workflow domain.
//!
//! [`CommunityError`] covers conditions that abort a workflow step.
//! Port-level errors ([`crate::ChatError`], [`crate::SourceHostError`],
//! [`crate::StoreError`]) are defined beside their traits.
//!
//! Nothing in the workflow is retried automatically apart from the voting
//! trial loop. [`ErrorKind`] tells the caller how a failure is reported.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SlugError;

/// How a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A role, team, member, channel or repository is missing. Reported to the
    /// initiating user or channel; the step is aborted.
    NotFound,
    /// The platform refused an action (closed DMs, privileged member).
    /// Swallowed or reported, never escalated.
    PermissionDenied,
    /// A user did not answer a prompt in time. Treated as a decline.
    Timeout,
    /// An external identity did not resolve. Reported as invalid input.
    InvalidInput,
    /// Anything else the platforms threw. Reported generically.
    Unexpected,
}

/// Errors that abort a workflow step.
#[derive(Debug, Error)]
pub enum CommunityError {
    /// A required object does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up (e.g. `"team role for 'idea-board'"`).
        what: String,
    },

    /// The bot is not allowed to perform the action.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// A prompt went unanswered.
    #[error("no reply within {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The submitted external username does not exist.
    #[error("'{login}' is not a known external account")]
    IdentityUnresolvable { login: String },

    /// A title could not be turned into a slug.
    #[error(transparent)]
    InvalidSlug(#[from] SlugError),

    /// The Config store or configuration file is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An unexpected failure from a platform or the store.
    #[error("platform error: {message}")]
    Platform { message: String },
}

impl CommunityError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::IdentityUnresolvable { .. } | Self::InvalidSlug(_) => ErrorKind::InvalidInput,
            Self::Configuration { .. } | Self::Platform { .. } => ErrorKind::Unexpected,
        }
    }
}
