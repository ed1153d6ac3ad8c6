//! Corner/offside extraction from per-team stat blocks.
//!
//! Stat values arrive as JSON null, a bare integer, an empty string, or a
//! percentage-suffixed string. null/empty default to zero; anything else
//! non-numeric is a hard error surfaced to the caller so it can skip just
//! that pair instead of the whole cycle.

use match_feed::TeamStatistics;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Corners,
    Offsides,
}

impl CountKind {
    /// Fingerprint namespace label.
    pub fn label(self) -> &'static str {
        match self {
            CountKind::Corners => "CORNERS",
            CountKind::Offsides => "OFFSIDES",
        }
    }

    /// The `type` string used in API-Football stat blocks.
    pub fn stat_name(self) -> &'static str {
        match self {
            CountKind::Corners => "Corner Kicks",
            CountKind::Offsides => "Offsides",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fixture {fixture_id}: unreadable {stat} value {raw:?}")]
pub struct StatValueError {
    pub fixture_id: u64,
    pub stat: &'static str,
    pub raw: String,
}

/// Normalize one raw stat value to a count. A missing entry counts as zero
/// (the API drops zero-valued stats early in a match).
fn normalize(value: Option<&serde_json::Value>) -> Result<u32, String> {
    let value = match value {
        None | Some(serde_json::Value::Null) => return Ok(0),
        Some(v) => v,
    };
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| n.to_string()),
        serde_json::Value::String(s) => {
            let trimmed = s.trim().trim_end_matches('%').trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed.parse::<u32>().map_err(|_| s.clone())
        }
        other => Err(other.to_string()),
    }
}

/// Extract the (home, away) pair for one count kind from a two-team block.
/// The blocks arrive in home-then-away order from the fixtures endpoint.
pub fn count_pair(
    blocks: &[TeamStatistics],
    kind: CountKind,
    fixture_id: u64,
) -> Result<(u32, u32), StatValueError> {
    let side = |idx: usize| -> Result<u32, StatValueError> {
        normalize(blocks[idx].raw_value(kind.stat_name())).map_err(|raw| StatValueError {
            fixture_id,
            stat: kind.stat_name(),
            raw,
        })
    };
    Ok((side(0)?, side(1)?))
}
