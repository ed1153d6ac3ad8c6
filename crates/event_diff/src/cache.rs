//! Cross-call change-detection state, one instance per process.
//!
//! Score/corner/offside baselines are per fixture id and live only in
//! memory — a restart forgets them by design. The notified-fingerprint set
//! is global and is what the owner persists across restarts; `dirty`
//! signals when it grew. Entries are never deleted; growth is bounded by
//! match volume.

use std::collections::{HashMap, HashSet};

use crate::fingerprint::Fingerprint;
use crate::stats::CountKind;

#[derive(Debug, Default)]
pub struct ChangeCache {
    last_scores: HashMap<u64, (u32, u32)>,
    last_corners: HashMap<u64, (u32, u32)>,
    last_offsides: HashMap<u64, (u32, u32)>,
    notified: HashSet<Fingerprint>,
    dirty: bool,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the notified set from persisted state at startup. Does not mark
    /// the cache dirty.
    pub fn restore_notified(&mut self, fingerprints: impl IntoIterator<Item = Fingerprint>) {
        self.notified.extend(fingerprints);
    }

    /// Phase one of the score update: read the previous baseline.
    /// Defaults to 0:0 for a fixture seen for the first time.
    pub fn score_baseline(&self, fixture_id: u64) -> (u32, u32) {
        self.last_scores.get(&fixture_id).copied().unwrap_or((0, 0))
    }

    /// Phase two: unconditionally overwrite the baseline with the current
    /// score. Callers must read the old value first — the two phases are
    /// separate methods precisely so the ordering is visible at the call
    /// site.
    pub fn record_score(&mut self, fixture_id: u64, score: (u32, u32)) {
        self.last_scores.insert(fixture_id, score);
    }

    pub fn count_baseline(&self, kind: CountKind, fixture_id: u64) -> Option<(u32, u32)> {
        match kind {
            CountKind::Corners => self.last_corners.get(&fixture_id).copied(),
            CountKind::Offsides => self.last_offsides.get(&fixture_id).copied(),
        }
    }

    pub fn record_count(&mut self, kind: CountKind, fixture_id: u64, pair: (u32, u32)) {
        match kind {
            CountKind::Corners => self.last_corners.insert(fixture_id, pair),
            CountKind::Offsides => self.last_offsides.insert(fixture_id, pair),
        };
    }

    pub fn already_notified(&self, fingerprint: &Fingerprint) -> bool {
        self.notified.contains(fingerprint)
    }

    /// Record a fingerprint as notified. Returns false if it was already
    /// present (the occurrence must not be emitted again).
    pub fn mark_notified(&mut self, fingerprint: Fingerprint) -> bool {
        let inserted = self.notified.insert(fingerprint);
        if inserted {
            self.dirty = true;
        }
        inserted
    }

    pub fn notified_len(&self) -> usize {
        self.notified.len()
    }

    /// Snapshot of the notified set for persistence.
    pub fn notified_fingerprints(&self) -> Vec<Fingerprint> {
        self.notified.iter().cloned().collect()
    }

    /// True once per growth of the notified set; resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
