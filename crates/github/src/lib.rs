//! GitHub adapter for Ideaforge.
//!
//! Implements the [`community::SourceHost`] trait for one GitHub organization:
//! user lookup, organization teams, repositories, team membership and
//! contributor statistics.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! Authentication, pagination, retries and status-code mapping are handled
//! here; the workflow never sees them.

mod client;
mod host;

pub use client::DEFAULT_API_BASE;
pub use host::GitHubHost;
