//! Thresholds that decide whether a proposal advances.
//!
//! Neither threshold is stored. Both are recomputed from configuration and
//! the live participant count at the moment a decision is taken.

/// Participant count from which the required ratio stops shrinking.
pub const RATIO_FLOOR_FROM: usize = 60;

/// Lowest fraction of participants that must respond, reached at
/// [`RATIO_FLOOR_FROM`] participants.
pub const RATIO_FLOOR: f64 = 0.20;

/// Highest trial index a proposal can reach. A proposal is polled at trials
/// `0..=MAX_TRIAL`, four rounds in total.
pub const MAX_TRIAL: u8 = 3;

/// Fraction of `participants` that must submit an identity for the team to be
/// provisioned.
///
/// `(80 - n) / 100` below [`RATIO_FLOOR_FROM`] participants and a flat
/// [`RATIO_FLOOR`] from there on.
pub fn required_ratio(participants: usize) -> f64 {
    if participants < RATIO_FLOOR_FROM {
        (80.0 - participants as f64) / 100.0
    } else {
        RATIO_FLOOR
    }
}

/// `true` when `responded` participants satisfy the quota for `participants`.
///
/// Evaluated in integer percent so boundary cases are exact.
pub fn gathering_quota_met(responded: usize, participants: usize) -> bool {
    let percent = if participants < RATIO_FLOOR_FROM {
        80 - participants
    } else {
        20
    };
    responded * 100 >= percent * participants
}

/// `true` when a vote count clears the configured threshold. The comparison
/// is strict: reaching the threshold exactly is not enough.
pub fn votes_sufficient(voters: usize, required_votes: usize) -> bool {
    voters > required_votes
}
