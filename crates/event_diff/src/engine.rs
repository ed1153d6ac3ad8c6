//! The diffing pass: one snapshot + cache in, new messages out.

use match_feed::{EventKind, FixtureSnapshot, TeamStatistics};
use tracing::debug;

use crate::cache::ChangeCache;
use crate::fingerprint;
use crate::format;
use crate::stats::{self, CountKind, StatValueError};

#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// Formatted messages, in emission order, each already deduplicated.
    pub messages: Vec<String>,
    /// Statistic pairs that could not be extracted this round. The rest of
    /// the diff has already completed; callers log these and move on.
    pub stat_errors: Vec<StatValueError>,
}

/// True when the snapshot lacks a usable two-team statistics block and a
/// supplementary fetch would help. Callers should fetch only for in-scope
/// fixtures.
pub fn needs_statistics(snap: &FixtureSnapshot) -> bool {
    snap.statistics.len() < 2
}

/// Diff one snapshot against the cache. Pure apart from cache mutation:
/// feeding the identical snapshot twice yields no messages the second time.
/// `supplementary` is the result of an optional external statistics fetch;
/// the snapshot's own block wins when both are present.
pub fn diff_snapshot(
    snap: &FixtureSnapshot,
    supplementary: Option<&[TeamStatistics]>,
    cache: &mut ChangeCache,
) -> DiffOutcome {
    let fid = snap.id();
    let (gh, ga) = (snap.home_goals(), snap.away_goals());
    let header = format::header(snap, gh, ga);
    let mut out = DiffOutcome::default();

    debug!(
        "diffing fixture #{fid}: {} {gh}-{ga} {} ({})",
        snap.teams.home.name, snap.teams.away.name, snap.league.name
    );

    // Two-phase baseline: capture the old score, then overwrite. The write
    // happens every round, whether or not anything is emitted.
    let (old_gh, old_ga) = cache.score_baseline(fid);
    cache.record_score(fid, (gh, ga));

    check_synthetic_goal(snap, cache, &header, (old_gh, old_ga), (gh, ga), &mut out);

    for event in &snap.events {
        let fp = fingerprint::raw_event(fid, event);
        if !cache.mark_notified(fp) {
            continue;
        }
        debug!(
            "new event for #{fid}: {} / {:?} at {}'",
            event.kind.label(),
            event.detail,
            event.time.elapsed
        );
        if let Some(body) = format::event_body(snap, event) {
            out.messages.push(format::compose(&header, &body));
        }
    }

    diff_statistics(snap, supplementary, cache, &header, &mut out);

    out
}

/// The API sometimes bumps the score before (or without) delivering the
/// Goal event. When the delta points at exactly one side, emit an inferred
/// goal; a both-sides change or a decrease is an upstream anomaly and stays
/// silent.
fn check_synthetic_goal(
    snap: &FixtureSnapshot,
    cache: &mut ChangeCache,
    header: &str,
    old: (u32, u32),
    new: (u32, u32),
    out: &mut DiffOutcome,
) {
    if new == old {
        return;
    }
    if snap.events.iter().any(|e| e.kind == EventKind::Goal) {
        return;
    }

    let scorer = if new.0 > old.0 && new.1 == old.1 {
        Some(&snap.teams.home.name)
    } else if new.1 > old.1 && new.0 == old.0 {
        Some(&snap.teams.away.name)
    } else {
        None
    };
    let Some(team) = scorer else { return };

    let minute = snap.fixture.status.elapsed;
    let fp = fingerprint::synthetic_goal(snap.id(), minute, new.0, new.1);
    if cache.mark_notified(fp) {
        debug!(
            "synthetic goal for #{}: {} ({}-{})",
            snap.id(),
            team,
            new.0,
            new.1
        );
        out.messages.push(format::compose(
            header,
            &format::synthetic_goal_body(team, new.0, new.1, minute),
        ));
    }
}

fn diff_statistics(
    snap: &FixtureSnapshot,
    supplementary: Option<&[TeamStatistics]>,
    cache: &mut ChangeCache,
    header: &str,
    out: &mut DiffOutcome,
) {
    // Snapshot's own block wins; otherwise the supplementary fetch result.
    let blocks: &[TeamStatistics] = if snap.statistics.len() >= 2 {
        &snap.statistics
    } else if let Some(extra) = supplementary.filter(|s| s.len() >= 2) {
        extra
    } else {
        return;
    };

    for kind in [CountKind::Corners, CountKind::Offsides] {
        match stats::count_pair(blocks, kind, snap.id()) {
            Ok(pair) => diff_count(snap, cache, header, kind, pair, out),
            Err(err) => out.stat_errors.push(err),
        }
    }
}

fn diff_count(
    snap: &FixtureSnapshot,
    cache: &mut ChangeCache,
    header: &str,
    kind: CountKind,
    pair: (u32, u32),
    out: &mut DiffOutcome,
) {
    let fid = snap.id();
    let baseline = cache.count_baseline(kind, fid);
    if baseline == Some(pair) {
        return;
    }

    let fp = fingerprint::count_change(fid, kind, pair.0, pair.1);
    if cache.already_notified(&fp) {
        // Recorded by a previous run whose in-memory baseline is gone
        // (restart / partial failure). Stay silent; do not touch baselines.
        return;
    }

    cache.record_count(kind, fid, pair);
    cache.mark_notified(fp);

    // Attribute corners to a side when exactly one count increased — same
    // delta-shape rule as synthetic goals. Offside changes stay neutral.
    let attributed = if kind == CountKind::Corners {
        let old = baseline.unwrap_or((0, 0));
        if pair.0 > old.0 && pair.1 == old.1 {
            Some(snap.teams.home.name.as_str())
        } else if pair.1 > old.1 && pair.0 == old.0 {
            Some(snap.teams.away.name.as_str())
        } else {
            None
        }
    } else {
        None
    };

    debug!("{} update for #{fid}: {}-{}", kind.label(), pair.0, pair.1);
    out.messages
        .push(format::compose(header, &format::count_body(kind, pair, attributed)));
}

// ====================================================================
// Tests
// ====================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(
        fid: u64,
        goals: (u32, u32),
        elapsed: i64,
        events: serde_json::Value,
        statistics: serde_json::Value,
    ) -> FixtureSnapshot {
        serde_json::from_value(json!({
            "fixture": { "id": fid, "status": { "elapsed": elapsed, "short": "2H" } },
            "league": { "id": 39, "name": "Premier League", "round": "Regular Season - 5" },
            "teams": {
                "home": { "id": 1, "name": "Alpha" },
                "away": { "id": 2, "name": "Beta" }
            },
            "goals": { "home": goals.0, "away": goals.1 },
            "events": events,
            "statistics": statistics
        }))
        .unwrap()
    }

    fn goal_event(minute: i64, team_id: u64, player: &str, detail: &str) -> serde_json::Value {
        json!({
            "time": { "elapsed": minute, "extra": null },
            "team": { "id": team_id, "name": if team_id == 1 { "Alpha" } else { "Beta" } },
            "player": { "name": player },
            "assist": { "name": null },
            "type": "Goal",
            "detail": detail
        })
    }

    fn stat_blocks(corners: (u32, u32), offsides: (u32, u32)) -> serde_json::Value {
        json!([
            {
                "team": { "id": 1, "name": "Alpha" },
                "statistics": [
                    { "type": "Corner Kicks", "value": corners.0 },
                    { "type": "Offsides", "value": offsides.0 }
                ]
            },
            {
                "team": { "id": 2, "name": "Beta" },
                "statistics": [
                    { "type": "Corner Kicks", "value": corners.1 },
                    { "type": "Offsides", "value": offsides.1 }
                ]
            }
        ])
    }

    #[test]
    fn identical_snapshot_twice_is_idempotent() {
        let snap = snapshot(
            100,
            (1, 0),
            30,
            json!([goal_event(12, 1, "J. Smith", "Normal Goal")]),
            stat_blocks((2, 1), (1, 0)),
        );
        let mut cache = ChangeCache::new();

        let first = diff_snapshot(&snap, None, &mut cache);
        assert!(!first.messages.is_empty());
        let notified_after_first = cache.notified_len();

        let second = diff_snapshot(&snap, None, &mut cache);
        assert!(second.messages.is_empty());
        assert!(second.stat_errors.is_empty());
        assert_eq!(cache.notified_len(), notified_after_first);
        assert_eq!(cache.score_baseline(100), (1, 0));
    }

    #[test]
    fn synthetic_goal_attributed_on_single_side_delta() {
        // 0:0 baseline, score jumps to 1:0 with no Goal event in the list.
        let snap = snapshot(200, (1, 0), 37, json!([]), json!([]));
        let mut cache = ChangeCache::new();

        let out = diff_snapshot(&snap, None, &mut cache);
        assert_eq!(out.messages.len(), 1);
        let msg = &out.messages[0];
        assert!(msg.contains("GOAL (Score Update via API)!"));
        assert!(msg.contains("Team: Alpha leads to 1-0"));
        assert!(msg.contains("Minute: 37'"));
    }

    #[test]
    fn synthetic_goal_suppressed_on_ambiguous_delta() {
        let mut cache = ChangeCache::new();
        cache.record_score(201, (1, 1));

        // Both sides changed: 1:1 → 2:2. Ambiguous, deliberately silent.
        let snap = snapshot(201, (2, 2), 80, json!([]), json!([]));
        let out = diff_snapshot(&snap, None, &mut cache);
        assert!(out.messages.is_empty());
        // Baseline still advances.
        assert_eq!(cache.score_baseline(201), (2, 2));
    }

    #[test]
    fn synthetic_goal_suppressed_on_score_decrease() {
        let mut cache = ChangeCache::new();
        cache.record_score(202, (2, 0));

        let snap = snapshot(202, (1, 0), 55, json!([]), json!([]));
        let out = diff_snapshot(&snap, None, &mut cache);
        assert!(out.messages.is_empty());
    }

    #[test]
    fn synthetic_goal_skipped_when_goal_event_present() {
        let snap = snapshot(
            203,
            (1, 0),
            21,
            json!([goal_event(21, 1, "J. Smith", "Normal Goal")]),
            json!([]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);

        // Exactly one message — the real goal, no synthetic twin.
        assert_eq!(out.messages.len(), 1);
        assert!(out.messages[0].contains("Scorer: J. Smith"));
    }

    #[test]
    fn repeated_polls_dedup_overlapping_events() {
        let mut cache = ChangeCache::new();

        // Poll 1: one goal.
        let snap1 = snapshot(
            100,
            (1, 0),
            12,
            json!([goal_event(12, 1, "J. Smith", "Normal Goal")]),
            json!([]),
        );
        let out1 = diff_snapshot(&snap1, None, &mut cache);

        // Poll 2: same goal verbatim + one new card.
        let snap2 = snapshot(
            100,
            (1, 0),
            25,
            json!([
                goal_event(12, 1, "J. Smith", "Normal Goal"),
                {
                    "time": { "elapsed": 24, "extra": null },
                    "team": { "id": 2, "name": "Beta" },
                    "player": { "name": "K. Jones" },
                    "assist": null,
                    "type": "Card",
                    "detail": "Yellow Card"
                }
            ]),
            json!([]),
        );
        let out2 = diff_snapshot(&snap2, None, &mut cache);

        // Poll 3: everything repeated, nothing new.
        let out3 = diff_snapshot(&snap2, None, &mut cache);

        let total = out1.messages.len() + out2.messages.len() + out3.messages.len();
        assert_eq!(total, 2); // one goal + one card, ever
        assert!(out2.messages[0].contains("🟨 Yellow Card"));
        assert!(out2.messages[0].contains("Player: K. Jones"));
        assert!(out3.messages.is_empty());
    }

    #[test]
    fn end_to_end_goal_scenario() {
        let snap = snapshot(
            555,
            (0, 0),
            9,
            json!([goal_event(8, 1, "J. Smith", "Normal Goal")]),
            json!([]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);

        assert_eq!(out.messages.len(), 1);
        let msg = &out.messages[0];
        assert!(msg.contains("Matchday 5"));
        assert!(msg.contains("🏴 Premier League"));
        assert!(msg.contains("<b>Alpha 0 : 0 Beta</b>"));
        assert!(msg.contains("⚽️ GOAL!"));
        assert!(!msg.contains("Own Goal"));
        assert!(!msg.contains("Penalty"));
        assert!(msg.contains("Scorer: J. Smith"));
        assert!(msg.contains("Assist: no assist"));
        assert!(msg.contains("8'"));
    }

    #[test]
    fn own_goal_and_penalty_markers_from_detail_text() {
        let snap = snapshot(
            556,
            (1, 0),
            70,
            json!([
                goal_event(65, 2, "A. Back", "Own Goal"),
                goal_event(70, 1, "J. Smith", "Penalty confirmed")
            ]),
            json!([]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);

        assert_eq!(out.messages.len(), 2);
        assert!(out.messages[0].contains("GOAL (Own Goal)!"));
        assert!(out.messages[1].contains("GOAL (Penalty)!"));
    }

    #[test]
    fn substitution_var_and_corner_events_format_by_team() {
        let snap = snapshot(
            557,
            (0, 0),
            61,
            json!([
                {
                    "time": { "elapsed": 60, "extra": null },
                    "team": { "id": 2, "name": "Beta" },
                    "player": { "name": "Out Guy" },
                    "assist": { "name": "In Guy" },
                    "type": "subst",
                    "detail": "Substitution 1"
                },
                {
                    "time": { "elapsed": 61, "extra": null },
                    "team": { "id": 1, "name": "Alpha" },
                    "player": null,
                    "assist": null,
                    "type": "Var",
                    "detail": "Goal cancelled - offside"
                },
                {
                    "time": { "elapsed": 61, "extra": 2 },
                    "team": { "id": 1, "name": "Alpha" },
                    "player": null,
                    "assist": null,
                    "type": "Corner",
                    "detail": "Corner awarded"
                }
            ]),
            json!([]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);

        assert_eq!(out.messages.len(), 3);
        assert!(out.messages[0].contains("🔄 Substitution (Beta)"));
        assert!(out.messages[0].contains("Out Guy → In Guy"));
        assert!(out.messages[1].contains("🖥️ VAR Check — Goal cancelled - offside"));
        assert!(out.messages[2].contains("📐 Corner (Alpha)"));
        assert!(out.messages[2].contains("61+2'"));
    }

    #[test]
    fn unknown_event_kinds_are_silent() {
        let snap = snapshot(
            558,
            (0, 0),
            15,
            json!([{
                "time": { "elapsed": 14, "extra": null },
                "team": { "id": 1, "name": "Alpha" },
                "player": null,
                "assist": null,
                "type": "Injury Break",
                "detail": "Drinks"
            }]),
            json!([]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);
        assert!(out.messages.is_empty());
    }

    #[test]
    fn corner_change_attributed_to_single_increasing_side() {
        let mut cache = ChangeCache::new();
        cache.record_count(CountKind::Corners, 300, (3, 2));
        // Pre-mark the (3,2) pair so only the change to (4,2) is fresh.
        cache.mark_notified(fingerprint::count_change(300, CountKind::Corners, 3, 2));

        let snap = snapshot(300, (0, 0), 50, json!([]), stat_blocks((4, 2), (0, 0)));
        let out = diff_snapshot(&snap, None, &mut cache);

        let corner_msgs: Vec<&String> = out
            .messages
            .iter()
            .filter(|m| m.contains("Corner Kicks"))
            .collect();
        assert_eq!(corner_msgs.len(), 1);
        assert!(corner_msgs[0].contains("📐 Corner Kicks: 4–2"));
        assert!(corner_msgs[0].contains("Won by: Alpha"));

        // Unchanged pair next round → silence.
        let again = diff_snapshot(&snap, None, &mut cache);
        assert!(again.messages.iter().all(|m| !m.contains("Corner Kicks")));
    }

    #[test]
    fn seen_count_pair_with_lost_baseline_stays_silent() {
        // Simulates a restart: fingerprint survived, baseline did not.
        let mut cache = ChangeCache::new();
        cache.mark_notified(fingerprint::count_change(301, CountKind::Offsides, 2, 1));

        let snap = snapshot(301, (0, 0), 50, json!([]), stat_blocks((0, 0), (2, 1)));
        let out = diff_snapshot(&snap, None, &mut cache);
        assert!(out.messages.iter().all(|m| !m.contains("Offsides")));
    }

    #[test]
    fn supplementary_block_used_only_when_snapshot_lacks_one() {
        let bare = snapshot(302, (0, 0), 10, json!([]), json!([]));
        assert!(needs_statistics(&bare));

        let supplementary: Vec<TeamStatistics> =
            serde_json::from_value(stat_blocks((1, 0), (0, 0))).unwrap();
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&bare, Some(&supplementary), &mut cache);
        assert!(out.messages.iter().any(|m| m.contains("Corner Kicks: 1–0")));

        let with_stats = snapshot(303, (0, 0), 10, json!([]), stat_blocks((5, 5), (0, 0)));
        assert!(!needs_statistics(&with_stats));
    }

    #[test]
    fn bad_stat_value_surfaces_error_without_aborting() {
        let snap = snapshot(
            304,
            (0, 0),
            40,
            json!([]),
            json!([
                {
                    "team": { "id": 1, "name": "Alpha" },
                    "statistics": [
                        { "type": "Corner Kicks", "value": "n/a" },
                        { "type": "Offsides", "value": 1 }
                    ]
                },
                {
                    "team": { "id": 2, "name": "Beta" },
                    "statistics": [
                        { "type": "Corner Kicks", "value": 2 },
                        { "type": "Offsides", "value": 0 }
                    ]
                }
            ]),
        );
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);

        // Corners pair failed, offsides pair still went through.
        assert_eq!(out.stat_errors.len(), 1);
        assert_eq!(out.stat_errors[0].stat, "Corner Kicks");
        assert!(out.messages.iter().any(|m| m.contains("🚩 Offsides: 1–0")));
    }

    #[test]
    fn absent_goal_counts_read_as_zero() {
        let snap: FixtureSnapshot = serde_json::from_value(json!({
            "fixture": { "id": 305, "status": { "elapsed": 1, "short": "1H" } },
            "league": { "id": 999, "name": "Cup", "round": null },
            "teams": {
                "home": { "id": 1, "name": "Alpha" },
                "away": { "id": 2, "name": "Beta" }
            },
            "goals": { "home": null, "away": null },
            "events": [],
            "statistics": []
        }))
        .unwrap();
        let mut cache = ChangeCache::new();
        let out = diff_snapshot(&snap, None, &mut cache);
        assert!(out.messages.is_empty());
        assert_eq!(cache.score_baseline(305), (0, 0));
    }
}
