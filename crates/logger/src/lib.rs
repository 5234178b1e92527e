/// oddscrape — Logger
/// JSONL audit stream for scrape runs, source health and suspension changes

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Cannot create log dir {:?}: {}", dir, e);
        }
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct ScrapeRunEvent {
    pub ts:          String,
    pub event:       &'static str,   // "SCRAPE_RUN"
    pub source:      String,
    pub mode:        String,         // "upcoming" | "live"
    pub events:      usize,
    pub pages:       usize,
    pub skipped:     usize,
    pub errors:      usize,
    pub timed_out:   bool,
    pub elapsed_ms:  u64,
}

#[derive(Serialize, Debug)]
pub struct ApiStatusEvent {
    pub ts:           String,
    pub event:        &'static str,  // "API_STATUS"
    pub source:       String,
    pub ok:           bool,
    pub message:      String,
    pub items_logged: usize,
}

#[derive(Serialize, Debug)]
pub struct SuspensionChangeEvent {
    pub ts:         String,
    pub event:      &'static str,    // "MARKET_SUSPENDED" | "MARKET_RESUMED"
    pub bookmaker:  String,
    pub event_id:   String,
    pub match_name: String,
    pub reason:     Option<String>,
    pub home_odds:  Option<f64>,
    pub draw_odds:  Option<f64>,
    pub away_odds:  Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct PollerHeartbeatEvent {
    pub ts:                 String,
    pub event:              &'static str, // "POLLER_HEARTBEAT"
    pub cycle:              u64,
    pub poll_interval_secs: u64,
    pub total_items:        usize,
    pub suspended_items:    usize,
    pub healthy_sources:    usize,
    pub total_sources:      usize,
}

#[derive(Serialize, Debug)]
pub struct PollerControlEvent {
    pub ts:      String,
    pub event:   &'static str,       // "POLLER_START" | "POLLER_STOP"
    pub changed: bool,
}
