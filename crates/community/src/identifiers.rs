//! Newtype domain identifiers.
//!
//! Chat-platform snowflakes and source-host integers are all `u64` under the
//! hood. Wrapping each in its own newtype keeps a [`RoleId`] from ever being
//! passed where a [`ChannelId`] is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is blank.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() { None } else { Some(Self(trimmed.to_string())) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (platform-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display, FromStr.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: chat-platform snowflakes
// ---------------------------------------------------------------------------

u64_id! {
    /// The guild (server) the bot manages. A deployment manages exactly one.
    GuildId
}

u64_id! {
    /// A guild member, or any user account seen by the chat platform.
    MemberId
}

u64_id! {
    /// A text channel, voice channel, DM channel or category.
    ChannelId
}

u64_id! {
    /// A category channel grouping a team's text and voice channels.
    CategoryId
}

u64_id! {
    /// A chat message. Proposal messages double as the proposal's identity.
    MessageId
}

u64_id! {
    /// A guild role (team role, leader role, or `@everyone`).
    RoleId
}

// ---------------------------------------------------------------------------
// Identifiers: source-host integers
// ---------------------------------------------------------------------------

u64_id! {
    /// A user account on the source-hosting platform.
    ExternalUserId
}

u64_id! {
    /// An organization team on the source-hosting platform.
    ExternalTeamId
}

u64_id! {
    /// A repository on the source-hosting platform.
    RepositoryId
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// A username (login) on the source-hosting platform, as typed by a member.
    ExternalUsername
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one run of a workflow task (a vote watch or a gathering window).
///
/// Generated fresh whenever a task starts or is resumed after a restart, and
/// recorded on the task's tracing span so its activity can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a new random task identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
