//! API-Football (api-sports.io v3) client + live fixture snapshot model
//!
//! Endpoints:
//!   GET /fixtures?live=all            → all currently live fixtures
//!   GET /fixtures/statistics?fixture= → per-team stat blocks for one fixture
//!
//! Auth: `x-apisports-key` header. Live data needs a paid plan; a 403/451
//! usually means key, quota or plan trouble — we log and return the error,
//! the polling loop treats it as "no fixtures this cycle".

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, warn};

pub const API_BASE: &str = "https://v3.football.api-sports.io";

/// Per-request timeout for the supplementary statistics fetch. Kept short —
/// a slow stats call must not stall the whole poll cycle.
const STATS_TIMEOUT_SECS: u64 = 10;

// ====================================================================
// Event kinds
// ====================================================================

/// Closed set of event types we understand. The provider is not consistent
/// about casing or spelling ("subst" vs "Substitution", "Var" vs "VAR"),
/// so parsing is case-insensitive and prefix-tolerant. Anything unknown
/// becomes `Other`, which downstream formatting deliberately ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Goal,
    Card,
    Substitution,
    Var,
    Corner,
    Other,
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim().to_ascii_lowercase();
        match t.as_str() {
            "goal" => EventKind::Goal,
            "card" => EventKind::Card,
            "var" => EventKind::Var,
            "corner" => EventKind::Corner,
            _ if t.starts_with("subst") => EventKind::Substitution,
            _ => EventKind::Other,
        }
    }

    /// Canonical label, stable across provider spelling drift. Used for
    /// fingerprinting and logs.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Goal => "Goal",
            EventKind::Card => "Card",
            EventKind::Substitution => "Substitution",
            EventKind::Var => "Var",
            EventKind::Corner => "Corner",
            EventKind::Other => "Other",
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventKind::parse(&raw))
    }
}

// ====================================================================
// Snapshot model (API-Football v3 wire shape)
// ====================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureSnapshot {
    pub fixture: FixtureMeta,
    pub league: League,
    pub teams: Teams,
    #[serde(default)]
    pub goals: Goals,
    #[serde(default)]
    pub events: Vec<MatchEvent>,
    #[serde(default)]
    pub statistics: Vec<TeamStatistics>,
}

impl FixtureSnapshot {
    pub fn id(&self) -> u64 {
        self.fixture.id
    }

    /// Absent goal counts are treated as 0 — the API omits them pre-kickoff.
    pub fn home_goals(&self) -> u32 {
        self.goals.home.unwrap_or(0)
    }

    pub fn away_goals(&self) -> u32 {
        self.goals.away.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureMeta {
    pub id: u64,
    #[serde(default)]
    pub status: FixtureStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureStatus {
    /// Elapsed minute; None before kickoff or when the API omits it.
    pub elapsed: Option<i64>,
    #[serde(default)]
    pub short: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct League {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub round: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Teams {
    pub home: TeamRef,
    pub away: TeamRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Goals {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchEvent {
    #[serde(default)]
    pub time: EventClock,
    #[serde(default)]
    pub team: EventSide,
    pub player: Option<Person>,
    pub assist: Option<Person>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub detail: String,
}

impl MatchEvent {
    pub fn player_name(&self) -> &str {
        self.player
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or("Unknown Player")
    }

    /// Assist (goals) doubles as the incoming player on substitutions.
    pub fn assist_name(&self) -> Option<&str> {
        self.assist
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    pub fn team_id(&self) -> u64 {
        self.team.id.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventClock {
    #[serde(default)]
    pub elapsed: i64,
    pub extra: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSide {
    pub id: Option<u64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamStatistics {
    pub team: EventSide,
    #[serde(rename = "statistics", default)]
    pub entries: Vec<StatEntry>,
}

impl TeamStatistics {
    /// Raw value for a named stat; None when the block lacks the entry.
    pub fn raw_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatEntry {
    #[serde(rename = "type")]
    pub name: String,
    /// null, bare integer, or string (possibly percentage-suffixed).
    #[serde(default)]
    pub value: serde_json::Value,
}

// ====================================================================
// API envelope
// ====================================================================

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    errors: serde_json::Value,
    #[serde(default = "Vec::new")]
    response: Vec<T>,
}

fn has_api_errors(errors: &serde_json::Value) -> bool {
    match errors {
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
        _ => false,
    }
}

/// First `max_chars` characters of an upstream body for error messages.
/// Cuts on a character boundary — byte slicing would panic on multibyte
/// bodies.
pub fn snippet(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ====================================================================
// Client
// ====================================================================

pub struct FootballApi {
    client: reqwest::Client,
    api_key: String,
}

impl FootballApi {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("livegoal/0.1")
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// All currently live fixtures. Upstream failure is an error for the
    /// caller to log; the next cycle simply retries.
    pub async fn live_fixtures(&self) -> Result<Vec<FixtureSnapshot>> {
        let url = format!("{API_BASE}/fixtures");
        let resp = self
            .client
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(&[("live", "all")])
            .send()
            .await
            .context("live fixtures request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("live fixtures HTTP {}: {}", status, snippet(&body, 200));
        }

        let envelope: ApiEnvelope<FixtureSnapshot> = resp
            .json()
            .await
            .context("failed to parse live fixtures response")?;
        if has_api_errors(&envelope.errors) {
            warn!("api-football reported errors: {}", envelope.errors);
        }
        debug!("received {} live fixtures", envelope.response.len());
        Ok(envelope.response)
    }

    /// Supplementary per-fixture statistics (two team blocks). Short
    /// timeout — a timeout is a fetch failure, not fatal.
    pub async fn fixture_statistics(&self, fixture_id: u64) -> Result<Vec<TeamStatistics>> {
        let url = format!("{API_BASE}/fixtures/statistics");
        let resp = self
            .client
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(&[("fixture", fixture_id.to_string())])
            .timeout(Duration::from_secs(STATS_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("statistics request failed for fixture {fixture_id}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("statistics HTTP {} for fixture {}", status, fixture_id);
        }

        let envelope: ApiEnvelope<TeamStatistics> = resp
            .json()
            .await
            .with_context(|| format!("failed to parse statistics for fixture {fixture_id}"))?;
        if has_api_errors(&envelope.errors) {
            warn!(
                "api-football statistics errors for {}: {}",
                fixture_id, envelope.errors
            );
        }
        Ok(envelope.response)
    }
}

// ====================================================================
// Tests
// ====================================================================
