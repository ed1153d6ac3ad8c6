//! Tracking policy + subscriber registry.
//!
//! Which fixtures are in scope: top-league fixtures automatically (minus
//! manual mutes), plus manually tracked fixture ids. Both manual sets and
//! the subscriber chat ids persist across restarts via the atomic store.
//! The diffing engine never touches these sets directly — the polling loop
//! feeds it the resulting boolean.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

pub mod store;

/// Auto-tracked league ids (API-Football): EPL, LaLiga, Serie A, Bundesliga,
/// Ligue 1, Championship, UCL, UEL, UECL, AFCON.
pub const LEAGUE_ALLOW_LIST: &[u32] = &[39, 140, 135, 78, 61, 40, 2, 3, 4, 114];

pub fn is_allow_listed(league_id: u32) -> bool {
    LEAGUE_ALLOW_LIST.contains(&league_id)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackedFile {
    #[serde(default)]
    manual: BTreeSet<u64>,
    #[serde(default)]
    muted: BTreeSet<u64>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Manual include/exclude sets on top of the league allow-list.
#[derive(Debug)]
pub struct TrackingPolicy {
    path: PathBuf,
    manual: BTreeSet<u64>,
    muted: BTreeSet<u64>,
}

impl TrackingPolicy {
    /// Load from disk; a missing or corrupt file resets to empty tracking
    /// with a warning, never a startup failure.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match store::load_json::<TrackedFile>(&path) {
            Ok(Some(f)) => f,
            Ok(None) => TrackedFile::default(),
            Err(e) => {
                warn!("could not load tracked state: {e:#} — resetting tracking");
                TrackedFile::default()
            }
        };
        Self {
            path,
            manual: file.manual,
            muted: file.muted,
        }
    }

    /// In scope: allow-listed league and not muted, or manually tracked.
    pub fn in_scope(&self, fixture_id: u64, league_id: u32) -> bool {
        (is_allow_listed(league_id) && !self.muted.contains(&fixture_id))
            || self.manual.contains(&fixture_id)
    }

    pub fn is_manual(&self, fixture_id: u64) -> bool {
        self.manual.contains(&fixture_id)
    }

    pub fn is_muted(&self, fixture_id: u64) -> bool {
        self.muted.contains(&fixture_id)
    }

    /// Returns false if the fixture was already tracked.
    pub fn track(&mut self, fixture_id: u64) -> Result<bool> {
        let added = self.manual.insert(fixture_id);
        if added {
            self.save()?;
        }
        Ok(added)
    }

    pub fn untrack(&mut self, fixture_id: u64) -> Result<bool> {
        let removed = self.manual.remove(&fixture_id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn mute(&mut self, fixture_id: u64) -> Result<bool> {
        let added = self.muted.insert(fixture_id);
        if added {
            self.save()?;
        }
        Ok(added)
    }

    pub fn unmute(&mut self, fixture_id: u64) -> Result<bool> {
        let removed = self.muted.remove(&fixture_id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn manual_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.manual.iter().copied()
    }

    pub fn muted_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.muted.iter().copied()
    }

    fn save(&self) -> Result<()> {
        store::save_json(
            &self.path,
            &TrackedFile {
                manual: self.manual.clone(),
                muted: self.muted.clone(),
                updated_at: Some(Utc::now().to_rfc3339()),
            },
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriberFile {
    #[serde(default)]
    chats: BTreeSet<i64>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Telegram chat ids that receive alert broadcasts.
#[derive(Debug)]
pub struct SubscriberBook {
    path: PathBuf,
    chats: BTreeSet<i64>,
}

impl SubscriberBook {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match store::load_json::<SubscriberFile>(&path) {
            Ok(Some(f)) => f,
            Ok(None) => SubscriberFile::default(),
            Err(e) => {
                warn!("could not load subscribers: {e:#} — starting empty");
                SubscriberFile::default()
            }
        };
        Self {
            path,
            chats: file.chats,
        }
    }

    pub fn subscribe(&mut self, chat_id: i64) -> Result<bool> {
        let added = self.chats.insert(chat_id);
        if added {
            self.save()?;
        }
        Ok(added)
    }

    /// Used both for /stop and for dropping blocked/not-found destinations.
    pub fn unsubscribe(&mut self, chat_id: i64) -> Result<bool> {
        let removed = self.chats.remove(&chat_id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn chats(&self) -> Vec<i64> {
        self.chats.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    fn save(&self) -> Result<()> {
        store::save_json(
            &self.path,
            &SubscriberFile {
                chats: self.chats.clone(),
                updated_at: Some(Utc::now().to_rfc3339()),
            },
        )
    }
}
