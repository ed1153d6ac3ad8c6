//! livegoal — Telegram live football alert bot
//!
//! What it does:
//!   1. Polls API-Football live fixtures on a fixed interval (default 20s)
//!   2. Diffs each in-scope fixture against the change-detection cache —
//!      goals (incl. score-delta synthetic goals), cards, substitutions,
//!      VAR checks, corner/offside count changes, each notified once
//!   3. Broadcasts formatted alerts to all subscribed Telegram chats
//!   4. Serves commands: /start /stop /track /untrack /mute /unmute
//!      /mygames /allgames /status
//!
//! Run:
//!   TELEGRAM_BOT_TOKEN=... API_FOOTBALL_KEY=... cargo run --bin goal-bot

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dotenv::dotenv;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use event_diff::ChangeCache;
use match_feed::FootballApi;
use tracker::{store, SubscriberBook, TrackingPolicy};

// ====================================================================
// Config
// ====================================================================

/// Telegram command polling cadence; fixture polls ride on top of this.
const COMMAND_POLL_SECS: u64 = 2;
/// Default fixture poll interval (override with CHECK_INTERVAL).
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 20;

const TRACKED_FILE: &str = "tracked.json";
const SUBSCRIBERS_FILE: &str = "subscribers.json";
const SEEN_EVENTS_FILE: &str = "seen_events.json";

// ====================================================================
// Telegram types + helpers
// ====================================================================

#[derive(Debug, Deserialize)]
struct TgUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TgUpdate>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

/// Outcome of one sendMessage call. `Blocked` marks destinations that
/// should be dropped from the subscriber set.
#[derive(Debug, PartialEq, Eq)]
enum SendStatus {
    Sent,
    Blocked,
}

async fn tg_send_message(
    client: &reqwest::Client,
    token: &str,
    chat_id: i64,
    text: &str,
) -> Result<SendStatus> {
    let url = format!("https://api.telegram.org/bot{token}/sendMessage");
    let body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    });
    let resp = client.post(&url).json(&body).send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(SendStatus::Sent);
    }

    let body = resp.text().await.unwrap_or_default();
    let lowered = body.to_lowercase();
    if status.as_u16() == 403
        || lowered.contains("bot was blocked")
        || lowered.contains("chat not found")
    {
        warn!("chat {} unreachable ({}): {}", chat_id, status, body);
        return Ok(SendStatus::Blocked);
    }
    anyhow::bail!("sendMessage to {} failed: {} — {}", chat_id, status, body)
}

async fn tg_get_updates(
    client: &reqwest::Client,
    token: &str,
    offset: i64,
) -> Result<TgUpdatesResponse> {
    let url = format!(
        "https://api.telegram.org/bot{token}/getUpdates?offset={offset}&timeout=0&allowed_updates=[\"message\"]"
    );
    let resp = client.get(&url).send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("getUpdates HTTP {}: {}", status, body);
    }
    let parsed: TgUpdatesResponse = serde_json::from_str(&body).with_context(|| {
        format!(
            "failed to parse getUpdates: {}",
            match_feed::snippet(&body, 200)
        )
    })?;
    Ok(parsed)
}

async fn tg_get_me(client: &reqwest::Client, token: &str) -> Result<i64> {
    let url = format!("https://api.telegram.org/bot{token}/getMe");
    let resp: serde_json::Value = client.get(&url).send().await?.json().await?;
    let bot_id = resp["result"]["id"].as_i64().unwrap_or(0);
    Ok(bot_id)
}

/// Send one alert to every subscriber. A failure for one destination never
/// blocks the rest; blocked/not-found chats are dropped from the set.
async fn broadcast(
    client: &reqwest::Client,
    token: &str,
    subscribers: &mut SubscriberBook,
    text: &str,
) {
    let mut dead: Vec<i64> = Vec::new();
    for chat_id in subscribers.chats() {
        match tg_send_message(client, token, chat_id, text).await {
            Ok(SendStatus::Sent) => {}
            Ok(SendStatus::Blocked) => dead.push(chat_id),
            Err(e) => warn!("send to {} failed: {}", chat_id, e),
        }
    }
    for chat_id in dead {
        info!("removing unreachable subscriber {}", chat_id);
        if let Err(e) = subscribers.unsubscribe(chat_id) {
            warn!("could not persist subscriber removal: {e:#}");
        }
    }
}

// ====================================================================
// Commands
// ====================================================================

struct BotStatus {
    started_at: DateTime<Utc>,
    last_live_count: usize,
}

/// Group clients address commands as `/start@botname`; the suffix is
/// routing, not part of the command.
fn command_name(token: &str) -> &str {
    token.split('@').next().unwrap_or(token)
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    client: &reqwest::Client,
    token: &str,
    api: &FootballApi,
    policy: &mut TrackingPolicy,
    subscribers: &mut SubscriberBook,
    cache: &ChangeCache,
    status: &BotStatus,
    chat_id: i64,
    text: &str,
) -> Result<()> {
    let mut parts = text.split_whitespace();
    let cmd = command_name(parts.next().unwrap_or(""));
    let arg = parts.next();

    let reply = |text: String| async move {
        if let Err(e) = tg_send_message(client, token, chat_id, &text).await {
            warn!("reply to {} failed: {}", chat_id, e);
        }
    };

    match cmd {
        "/start" => {
            let added = subscribers.subscribe(chat_id)?;
            if added {
                info!("new subscriber: {}", chat_id);
            }
            reply(
                "<b>Live Football Tracker</b>\n\n\
                 • Top-league matches are tracked automatically\n\
                 • Use /track &lt;fixture_id&gt; to follow any other match\n\n\
                 Commands:\n\
                 /track 123456789\n\
                 /untrack 123456789\n\
                 /mute 123456789 — pause an auto-tracked match\n\
                 /unmute 123456789\n\
                 /mygames — your tracked matches\n\
                 /allgames — all live tracked matches\n\
                 /stop — unsubscribe"
                    .to_string(),
            )
            .await;
        }
        "/stop" => {
            let removed = subscribers.unsubscribe(chat_id)?;
            let msg = if removed {
                "Unsubscribed. Send /start to get alerts again."
            } else {
                "You were not subscribed."
            };
            reply(msg.to_string()).await;
        }
        "/track" | "/untrack" | "/mute" | "/unmute" => {
            let Some(fid) = arg.and_then(|a| a.parse::<u64>().ok()) else {
                reply(format!("Usage: {cmd} &lt;fixture_id&gt;")).await;
                return Ok(());
            };
            let msg = match cmd {
                "/track" => {
                    policy.track(fid)?;
                    format!("Now tracking match <code>#{fid}</code>")
                }
                "/untrack" => {
                    if policy.untrack(fid)? {
                        format!("Stopped tracking <code>#{fid}</code>")
                    } else {
                        format!("Match <code>#{fid}</code> was not tracked")
                    }
                }
                "/mute" => {
                    policy.mute(fid)?;
                    format!("Muted match <code>#{fid}</code>")
                }
                _ => {
                    if policy.unmute(fid)? {
                        format!("Unmuted <code>#{fid}</code>")
                    } else {
                        format!("Match <code>#{fid}</code> was not muted")
                    }
                }
            };
            reply(msg).await;
        }
        "/mygames" => {
            let manual: Vec<u64> = policy.manual_ids().collect();
            let muted: Vec<u64> = policy.muted_ids().collect();
            if manual.is_empty() && muted.is_empty() {
                reply(
                    "You have no manually tracked matches.\n\nTop leagues are always active."
                        .to_string(),
                )
                .await;
                return Ok(());
            }
            let mut out = String::from("<b>Your tracked matches:</b>\n\n");
            for fid in &manual {
                out.push_str(&format!("• <code>#{fid}</code>\n"));
            }
            if !muted.is_empty() {
                out.push_str("\n<b>Muted:</b>\n");
                for fid in &muted {
                    out.push_str(&format!("• <code>#{fid}</code>\n"));
                }
            }
            out.push_str("\n/untrack &lt;id&gt; — to stop");
            reply(out).await;
        }
        "/allgames" => {
            reply("Fetching list of all currently tracked live matches...".to_string()).await;
            match api.live_fixtures().await {
                Ok(fixtures) => {
                    let mut lines: Vec<String> = Vec::new();
                    for fx in &fixtures {
                        let fid = fx.id();
                        if !policy.in_scope(fid, fx.league.id) {
                            continue;
                        }
                        let mut tags: Vec<&str> = Vec::new();
                        if tracker::is_allow_listed(fx.league.id) && !policy.is_muted(fid) {
                            tags.push("Auto");
                        }
                        if policy.is_manual(fid) {
                            tags.push("Manual");
                        }
                        lines.push(format!(
                            "• <code>#{fid}</code> | {} {}-{} {} ({}) [{}]",
                            fx.teams.home.name,
                            fx.home_goals(),
                            fx.away_goals(),
                            fx.teams.away.name,
                            fx.league.name,
                            tags.join(", ")
                        ));
                    }
                    let msg = if lines.is_empty() {
                        "No tracked matches are currently live.".to_string()
                    } else {
                        format!(
                            "<b>ALL Currently Tracked Live Matches:</b>\n\n{}\n\n\
                             /track &lt;id&gt; — to add a match\n/untrack &lt;id&gt; — to stop",
                            lines.join("\n")
                        )
                    };
                    reply(msg).await;
                }
                Err(e) => {
                    warn!("/allgames fixture fetch failed: {e:#}");
                    reply("An error occurred while fetching live matches.".to_string()).await;
                }
            }
        }
        "/status" => {
            let uptime_mins = (Utc::now() - status.started_at).num_minutes();
            reply(format!(
                "<b>Bot status</b>\n\n\
                 Uptime: {} min\n\
                 Subscribers: {}\n\
                 Live fixtures last cycle: {}\n\
                 Manually tracked: {}\n\
                 Notified occurrences: {}",
                uptime_mins,
                subscribers.len(),
                status.last_live_count,
                policy.manual_ids().count(),
                cache.notified_len(),
            ))
            .await;
        }
        _ if cmd.starts_with('/') => {
            reply("Unknown command. Try /start".to_string()).await;
        }
        _ => {}
    }
    Ok(())
}

// ====================================================================
// Keep-alive shim (hosting watchdog pings)
// ====================================================================

async fn keep_alive_server(bind: String) -> Result<()> {
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("keep-alive bind {bind}"))?;
    info!("keep-alive http listening on http://{bind} (GET /, /health)");

    loop {
        let (mut stream, peer) = listener.accept().await.context("keep-alive accept")?;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = match stream.read(&mut buf).await {
                Ok(n) if n > 0 => n,
                _ => return,
            };
            let req = String::from_utf8_lossy(&buf[..n]);
            let path = req
                .lines()
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .nth(1)
                .unwrap_or("/");
            let (status_line, body) = match path {
                "/" | "/health" => ("HTTP/1.1 200 OK", "livegoal bot is alive"),
                _ => ("HTTP/1.1 404 Not Found", "not found"),
            };
            let resp = format!(
                "{status_line}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            if let Err(e) = stream.write_all(resp.as_bytes()).await {
                debug!("keep-alive write err {}: {}", peer, e);
            }
        });
    }
}

// ====================================================================
// Main
// ====================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("=== livegoal — live football alert bot ===");

    let token = env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;
    let api_key = env::var("API_FOOTBALL_KEY").context("API_FOOTBALL_KEY is not set")?;
    let check_interval_secs = env::var("CHECK_INTERVAL")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
    let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
    let keep_alive_bind =
        env::var("KEEP_ALIVE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    // Single instance lock
    let lock_file_path = env::temp_dir().join("livegoal_bot.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of goal-bot is already running! Exiting.");
            return Ok(());
        }
    };

    info!("Fixture poll interval: {}s", check_interval_secs);

    // Persisted state
    let tracked_path = data_dir.join(TRACKED_FILE);
    let subscribers_path = data_dir.join(SUBSCRIBERS_FILE);
    let seen_path = data_dir.join(SEEN_EVENTS_FILE);

    let mut policy = TrackingPolicy::load(&tracked_path);
    let mut subscribers = SubscriberBook::load(&subscribers_path);

    let mut cache = ChangeCache::new();
    match store::load_json::<Vec<event_diff::Fingerprint>>(&seen_path) {
        Ok(Some(seen)) => {
            info!("Restored {} notified fingerprints.", seen.len());
            cache.restore_notified(seen);
        }
        Ok(None) => info!("No previous notified-fingerprint state."),
        Err(e) => warn!("could not load {}: {e:#} — starting empty", seen_path.display()),
    }
    info!(
        "Initial state: {} manually tracked, {} muted, {} subscribers.",
        policy.manual_ids().count(),
        policy.muted_ids().count(),
        subscribers.len()
    );

    // Keep-alive webserver for hosting watchdogs
    tokio::spawn(async move {
        if let Err(e) = keep_alive_server(keep_alive_bind).await {
            warn!("keep-alive server stopped: {e:#}");
        }
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    let bot_id = tg_get_me(&client, &token).await.context("getMe failed")?;
    info!("Telegram bot online, bot_id={}", bot_id);

    let api = FootballApi::new(api_key)?;
    let mut status = BotStatus {
        started_at: Utc::now(),
        last_live_count: 0,
    };

    let mut update_offset: i64 = 0;
    let mut cycle: u64 = 0;
    let poll_every = (check_interval_secs / COMMAND_POLL_SECS).max(1);
    let mut fixture_tick = poll_every; // poll immediately on the first pass

    loop {
        // 1) Telegram commands
        match tg_get_updates(&client, &token, update_offset).await {
            Ok(updates) => {
                if !updates.ok {
                    warn!("getUpdates returned ok=false");
                }
                for u in &updates.result {
                    update_offset = u.update_id + 1;
                    let Some(msg) = &u.message else { continue };
                    let Some(text) = msg.text.as_deref() else { continue };
                    if let Err(e) = handle_command(
                        &client,
                        &token,
                        &api,
                        &mut policy,
                        &mut subscribers,
                        &cache,
                        &status,
                        msg.chat.id,
                        text.trim(),
                    )
                    .await
                    {
                        warn!("command handling failed: {e:#}");
                    }
                }
            }
            Err(e) => warn!("getUpdates error: {}", e),
        }

        // 2) Fixture poll on the slower cadence
        fixture_tick += 1;
        if fixture_tick >= poll_every {
            fixture_tick = 0;
            cycle += 1;
            info!("--- tracking cycle #{} ---", cycle);

            match api.live_fixtures().await {
                Ok(fixtures) => {
                    status.last_live_count = fixtures.len();
                    let mut analyzed = 0usize;

                    for fx in &fixtures {
                        let fid = fx.id();
                        let in_scope = policy.in_scope(fid, fx.league.id);
                        if !in_scope {
                            debug!(
                                "skip #{fid} {} vs {} — not tracked",
                                fx.teams.home.name, fx.teams.away.name
                            );
                            continue;
                        }
                        analyzed += 1;

                        // Supplementary statistics only for in-scope fixtures
                        // whose snapshot lacks a two-team block. A failure or
                        // timeout means "no statistics this round".
                        let supplementary = if event_diff::needs_statistics(fx) {
                            match api.fixture_statistics(fid).await {
                                Ok(blocks) if blocks.len() >= 2 => Some(blocks),
                                Ok(_) => {
                                    debug!("no statistics available for #{fid} this round");
                                    None
                                }
                                Err(e) => {
                                    warn!("statistics fetch failed for #{fid}: {e:#}");
                                    None
                                }
                            }
                        } else {
                            None
                        };

                        let outcome =
                            event_diff::diff_snapshot(fx, supplementary.as_deref(), &mut cache);
                        for err in &outcome.stat_errors {
                            warn!("stat extraction skipped: {err}");
                        }
                        if !outcome.messages.is_empty() {
                            info!("{} new alert(s) for #{fid}", outcome.messages.len());
                        }
                        for msg in &outcome.messages {
                            broadcast(&client, &token, &mut subscribers, msg).await;
                        }
                    }

                    info!(
                        "cycle done: {} live, {} analyzed.",
                        fixtures.len(),
                        analyzed
                    );
                }
                Err(e) => warn!("fixture fetch failed: {e:#} — retrying next cycle"),
            }

            // Persist the fingerprint set whenever it grew this cycle.
            if cache.take_dirty() {
                if let Err(e) = store::save_json(&seen_path, &cache.notified_fingerprints()) {
                    warn!("could not persist notified fingerprints: {e:#}");
                }
            }
        }

        sleep(Duration::from_secs(COMMAND_POLL_SECS)).await;
    }
}
