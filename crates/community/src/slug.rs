//! Slug derivation for proposal titles.
//!
//! A [`Slug`] is the unique key shared by a proposal, its team, the team's
//! role, category, external team and repository. It is derived once from the
//! human title and then used verbatim everywhere else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of characters accepted in a title before normalization.
pub const MAX_TITLE_CHARS: usize = 95;

/// Titles passed to the manual team-creation command must be shorter than this.
pub const MAX_MANUAL_TEAM_TITLE_CHARS: usize = 45;

/// Reasons a title cannot be turned into a slug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    /// The source title is longer than [`MAX_TITLE_CHARS`].
    #[error("title is {length} characters long; at most {MAX_TITLE_CHARS} are allowed")]
    TooLong { length: usize },

    /// Nothing in `[a-z-]` survived normalization.
    #[error("title contains no usable characters")]
    Empty,

    /// A stored value that should already be a slug is not in normal form.
    #[error("'{0}' is not a normalized slug")]
    NotNormalized(String),
}

/// A normalized identifier: lowercase ASCII letters and single hyphens, never
/// ending in a hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Derives a slug from a free-form title.
    ///
    /// Lowercases, turns spaces into hyphens, strips everything outside
    /// `[a-z-]`, collapses hyphen runs and trims a trailing hyphen.
    pub fn derive(title: &str) -> Result<Self, SlugError> {
        let length = title.chars().count();
        if length > MAX_TITLE_CHARS {
            return Err(SlugError::TooLong { length });
        }

        let mut out = String::with_capacity(title.len());
        for c in title.to_lowercase().chars() {
            let c = if c == ' ' { '-' } else { c };
            if !(c.is_ascii_lowercase() || c == '-') {
                continue;
            }
            if c == '-' && out.ends_with('-') {
                continue;
            }
            out.push(c);
        }
        if out.ends_with('-') {
            out.pop();
        }

        if out.is_empty() {
            return Err(SlugError::Empty);
        }
        Ok(Self(out))
    }

    /// Accepts a value that must already be in normal form (stored keys,
    /// embed titles, role names).
    pub fn parse(value: &str) -> Result<Self, SlugError> {
        match Self::derive(value) {
            Ok(slug) if slug.0 == value => Ok(slug),
            _ => Err(SlugError::NotNormalized(value.to_string())),
        }
    }

    /// Returns the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the team's leader role.
    pub fn leader_role_name(&self) -> String {
        format!("pl-{}", self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
