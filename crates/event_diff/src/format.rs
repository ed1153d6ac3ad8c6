//! Message formatting: header + per-occurrence bodies (Telegram HTML).

use match_feed::{EventKind, FixtureSnapshot, MatchEvent};

use crate::stats::CountKind;

pub(crate) const SEPARATOR: &str = "──────────────────";

/// Flag emoji for the leagues we recognise; unmapped leagues get none.
fn league_flag(league_id: u32) -> &'static str {
    match league_id {
        39 => "🏴",
        140 => "🇪🇸",
        135 => "🇮🇹",
        78 => "🇩🇪",
        61 => "🇫🇷",
        _ => "",
    }
}

/// Display header prepended to every message for this fixture.
pub(crate) fn header(snap: &FixtureSnapshot, home_goals: u32, away_goals: u32) -> String {
    let flag = league_flag(snap.league.id);
    let league_line = if flag.is_empty() {
        format!("<b>{}</b>", snap.league.name)
    } else {
        format!("<b>{} {}</b>", flag, snap.league.name)
    };
    let round = snap
        .league
        .round
        .as_deref()
        .unwrap_or("")
        .replace("Regular Season - ", "Matchday ");
    format!(
        "{league_line}\n{round}\n\n<b>{} {} : {} {}</b>",
        snap.teams.home.name, home_goals, away_goals, snap.teams.away.name
    )
}

pub(crate) fn compose(header: &str, body: &str) -> String {
    format!("{header}\n\n{body}\n{SEPARATOR}")
}

fn minute_label(elapsed: i64, extra: Option<i64>) -> String {
    match extra {
        Some(x) if x > 0 => format!("{elapsed}+{x}'"),
        _ => format!("{elapsed}'"),
    }
}

/// Resolve the event's team name by id comparison against the home side.
fn event_team<'a>(snap: &'a FixtureSnapshot, event: &MatchEvent) -> &'a str {
    if event.team_id() == snap.teams.home.id {
        &snap.teams.home.name
    } else {
        &snap.teams.away.name
    }
}

/// Body for one raw feed event, or None for kinds we deliberately skip.
pub(crate) fn event_body(snap: &FixtureSnapshot, event: &MatchEvent) -> Option<String> {
    let time = minute_label(event.time.elapsed, event.time.extra);
    let detail_lower = event.detail.to_lowercase();

    match event.kind {
        EventKind::Goal => {
            let own = if detail_lower.contains("own") { " (Own Goal)" } else { "" };
            let pen = if detail_lower.contains("penalty") { " (Penalty)" } else { "" };
            Some(format!(
                "⚽️ GOAL{own}{pen}!\nScorer: {}\nAssist: {}\n{time}",
                event.player_name(),
                event.assist_name().unwrap_or("no assist"),
            ))
        }
        EventKind::Card => {
            let card = if detail_lower.contains("yellow") {
                "🟨 Yellow Card"
            } else {
                "🟥 Red Card"
            };
            Some(format!("{card}\nPlayer: {}\n{time}", event.player_name()))
        }
        EventKind::Substitution => Some(format!(
            "🔄 Substitution ({})\n{} → {}\n{time}",
            event_team(snap, event),
            event.player_name(),
            event.assist_name().unwrap_or("Unknown Player"),
        )),
        EventKind::Var => Some(format!("🖥️ VAR Check — {}\n{time}", event.detail)),
        EventKind::Corner => Some(format!("📐 Corner ({})\n{time}", event_team(snap, event))),
        EventKind::Other => None,
    }
}

/// Body for a goal inferred from a score delta with no Goal event present.
pub(crate) fn synthetic_goal_body(
    team: &str,
    home_goals: u32,
    away_goals: u32,
    minute: Option<i64>,
) -> String {
    let minute = minute.map_or_else(|| "??".to_string(), |m| m.to_string());
    format!(
        "⚽️ GOAL (Score Update via API)!\nTeam: {team} leads to {home_goals}-{away_goals}\nMinute: {minute}'"
    )
}

/// Body for a corner/offside count change, with optional side attribution.
pub(crate) fn count_body(kind: CountKind, pair: (u32, u32), attributed_to: Option<&str>) -> String {
    let line = match kind {
        CountKind::Corners => format!("📐 Corner Kicks: {}–{}", pair.0, pair.1),
        CountKind::Offsides => format!("🚩 Offsides: {}–{}", pair.0, pair.1),
    };
    match attributed_to {
        Some(team) => format!("{line}\nWon by: {team}"),
        None => line,
    }
}
