//! Deduplicated event-diffing engine for live fixture snapshots.
//!
//! The upstream feed re-sends the same and overlapping data on every poll,
//! sometimes late, sometimes with fields missing. Given one snapshot and the
//! cross-call [`ChangeCache`], [`diff_snapshot`] emits every notable
//! occurrence (goal, card, substitution, VAR check, corner/offside count
//! change, score-delta synthetic goal) exactly once, as a formatted message
//! string ready for delivery.
//!
//! The engine is pure and synchronous: the caller owns the cache, decides
//! when to fetch supplementary statistics, and handles delivery.

mod cache;
mod engine;
mod fingerprint;
mod format;
mod stats;

pub use cache::ChangeCache;
pub use engine::{diff_snapshot, needs_statistics, DiffOutcome};
pub use fingerprint::Fingerprint;
pub use stats::{CountKind, StatValueError};
