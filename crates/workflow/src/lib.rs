//! Ideaforge workflow orchestration.
//!
//! This crate drives a proposal through its whole life: the vote, the
//! identity-gathering window, team provisioning and leader election. It also
//! hosts the [`Coordinator`], which turns chat events into those steps and
//! rebuilds in-flight workflows after a restart.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Modules sequence calls between the business rules
//! in the [`community`] crate and its ports (`ChatPlatform`, `SourceHost`,
//! `Store`). They hold no domain rules of their own and never touch a
//! transport directly.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`votes`] | Vote Collector: trial loop over a proposal's approval reactions |
//! | [`gathering`] | Participant Gatherer and the identity acceptance rule |
//! | [`provisioner`] | Idempotent team provisioning |
//! | [`leadership`] | Leader-voting channel and candidacy messages |
//! | [`discipline`] | Warnings and removal |
//! | [`markers`] | Marker queries over channel history |
//! | [`prompts`] | Reply routing for interactive prompts |
//! | [`coordinator`] | Event dispatch, task leases and restart recovery |
//!
//! Command handlers live in `submission`, `membership` and `admin` as
//! further `impl Coordinator` blocks.

mod admin;
pub mod coordinator;
pub mod discipline;
pub mod errors;
pub mod gathering;
pub mod leadership;
pub mod markers;
mod membership;
pub mod prompts;
pub mod provisioner;
mod services;
mod submission;
pub mod votes;

#[cfg(test)]
mod testing;

pub use admin::ACTIVITY_WINDOW_DAYS;
pub use coordinator::{Coordinator, ResumableTask};
pub use errors::{WorkflowError, WorkflowResult};
pub use gathering::{GatheringOutcome, IdentityOutcome};
pub use services::{mention, Services};
pub use submission::SUBMISSION_COOLDOWN;
pub use votes::{VoteCollector, VoteOutcome};
