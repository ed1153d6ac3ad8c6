//! live-probe — one-shot diagnostic dump of the live fixture feed.
//!
//! Fetches the current live fixtures and prints one line per match with
//! its id, score, league and whether the default tracking policy would
//! alert on it. Handy for checking the API key and picking fixture ids
//! to /track.
//!
//! Run: API_FOOTBALL_KEY=... cargo run --bin live-probe

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::env;
use tracing_subscriber::{fmt, EnvFilter};

use match_feed::FootballApi;
use tracker::TrackingPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_key = env::var("API_FOOTBALL_KEY").context("API_FOOTBALL_KEY is not set")?;
    let api = FootballApi::new(api_key)?;
    let policy = TrackingPolicy::load("data/tracked.json");

    let fixtures = api.live_fixtures().await.context("live fixture fetch")?;
    println!("{} live fixture(s)\n", fixtures.len());

    for fx in &fixtures {
        let fid = fx.id();
        let marker = if policy.in_scope(fid, fx.league.id) {
            "TRACKED"
        } else {
            "  --  "
        };
        let minute = match fx.fixture.status.elapsed {
            Some(m) => format!("{m}'"),
            None => fx.fixture.status.short.clone().unwrap_or_else(|| "?".into()),
        };
        println!(
            "[{marker}] #{fid:<10} {:>4} {} {}-{} {} ({} #{})",
            minute,
            fx.teams.home.name,
            fx.home_goals(),
            fx.away_goals(),
            fx.teams.away.name,
            fx.league.name,
            fx.league.id,
        );
    }

    Ok(())
}
