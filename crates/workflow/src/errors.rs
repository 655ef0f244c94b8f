//! Workflow error type.

use community::{ChatError, CommunityError, ErrorKind, SlugError, SourceHostError, StoreError};
use thiserror::Error;

/// Anything that aborts a workflow step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    SourceHost(#[from] SourceHostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Community(#[from] CommunityError),
}

impl From<SlugError> for WorkflowError {
    fn from(err: SlugError) -> Self {
        Self::Community(CommunityError::InvalidSlug(err))
    }
}

impl WorkflowError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Community(CommunityError::not_found(what))
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::Community(CommunityError::PermissionDenied {
            reason: reason.into(),
        })
    }

    /// Where this failure sits in the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Chat(ChatError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Chat(ChatError::Forbidden { .. }) => ErrorKind::PermissionDenied,
            Self::Chat(ChatError::Platform { .. }) => ErrorKind::Unexpected,
            Self::SourceHost(SourceHostError::UnknownUser { .. }) => ErrorKind::InvalidInput,
            Self::SourceHost(SourceHostError::NotFound { .. }) => ErrorKind::NotFound,
            Self::SourceHost(SourceHostError::Api { .. }) => ErrorKind::Unexpected,
            Self::Store(_) => ErrorKind::Unexpected,
            Self::Community(err) => err.kind(),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
