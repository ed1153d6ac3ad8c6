//! Stable fingerprints for already-notified occurrences.
//!
//! SHA-256 truncated to 128 bits, hex-encoded. Collision-resistant in
//! practice; does not need to be cryptographically secure. Raw event keys
//! deliberately exclude player identity — the upstream feed gives no better
//! key, so two events with identical minute/kind/detail/team collide.

use match_feed::{EventKind, MatchEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::stats::CountKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn digest(input: &str) -> Self {
        let hash = Sha256::digest(input.as_bytes());
        Fingerprint(hex::encode(&hash[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key for a raw feed event. Hashes the canonical kind label rather than
/// the provider's raw type string, so spelling drift ("subst" →
/// "Substitution") cannot re-notify an already-sent event.
pub fn raw_event(fixture_id: u64, event: &MatchEvent) -> Fingerprint {
    event_key(
        fixture_id,
        event.time.elapsed,
        event.kind,
        &event.detail,
        event.team_id(),
    )
}

pub fn event_key(
    fixture_id: u64,
    elapsed: i64,
    kind: EventKind,
    detail: &str,
    team_id: u64,
) -> Fingerprint {
    Fingerprint::digest(&format!(
        "{fixture_id}|{elapsed}|{}|{detail}|{team_id}",
        kind.label()
    ))
}

/// Key for a goal inferred purely from a score delta. `minute` is absent
/// when the feed has not reported an elapsed time yet.
pub fn synthetic_goal(fixture_id: u64, minute: Option<i64>, home: u32, away: u32) -> Fingerprint {
    let minute = minute.map_or_else(|| "??".to_string(), |m| m.to_string());
    Fingerprint::digest(&format!("{fixture_id}|{minute}|GOAL_SYNTHETIC|{home}|{away}"))
}

/// Key for a corner/offside count change, keyed on the new pair.
pub fn count_change(fixture_id: u64, kind: CountKind, home: u32, away: u32) -> Fingerprint {
    Fingerprint::digest(&format!("{fixture_id}|{}|{home}|{away}", kind.label()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tuple_same_fingerprint() {
        let a = event_key(100, 42, EventKind::Goal, "Normal Goal", 7);
        let b = event_key(100, 42, EventKind::Goal, "Normal Goal", 7);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn any_field_change_changes_fingerprint() {
        let base = event_key(100, 42, EventKind::Goal, "Normal Goal", 7);
        assert_ne!(base, event_key(101, 42, EventKind::Goal, "Normal Goal", 7));
        assert_ne!(base, event_key(100, 43, EventKind::Goal, "Normal Goal", 7));
        assert_ne!(base, event_key(100, 42, EventKind::Card, "Normal Goal", 7));
        assert_ne!(base, event_key(100, 42, EventKind::Goal, "Own Goal", 7));
        assert_ne!(base, event_key(100, 42, EventKind::Goal, "Normal Goal", 8));
    }

    #[test]
    fn drifted_type_spelling_maps_to_same_key() {
        let a = event_key(9, 61, EventKind::parse("subst"), "Substitution 2", 4);
        let b = event_key(9, 61, EventKind::parse("Substitution"), "Substitution 2", 4);
        assert_eq!(a, b);
    }

    #[test]
    fn synthetic_and_count_keys_are_distinct_spaces() {
        let synth = synthetic_goal(100, Some(42), 1, 0);
        let corners = count_change(100, CountKind::Corners, 1, 0);
        let offsides = count_change(100, CountKind::Offsides, 1, 0);
        assert_ne!(synth, corners);
        assert_ne!(corners, offsides);
    }

    #[test]
    fn unknown_minute_marker_is_stable() {
        assert_eq!(
            synthetic_goal(100, None, 2, 1),
            synthetic_goal(100, None, 2, 1)
        );
        assert_ne!(
            synthetic_goal(100, None, 2, 1),
            synthetic_goal(100, Some(77), 2, 1)
        );
    }
}
