//! Live poller — interval loop over the live sources with start/stop control
//!
//! Each cycle:
//!   1. scrape every configured source (concurrently)
//!   2. replace the in-memory snapshot (a source that failed keeps its last listing)
//!   3. run every record through the suspension tracker, log + store transitions
//!   4. push an update to WS subscribers
//!   5. write the snapshot file and history rows

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use logger::{now_iso, EventLogger, PollerControlEvent, PollerHeartbeatEvent, SuspensionChangeEvent};
use odds_core::config::env_or;
use odds_core::output::{read_json_file, write_json_file};
use odds_core::{EventRecord, Mode, ScrapeReport, ScrapeSettings, SuspensionTracker, Transition};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::history_db::{DbMsg, DbRunRow, DbSnapshotRow, DbSuspensionRow};
use crate::sources::{self, SourceId};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval:      Duration,
    pub sources:       Vec<SourceId>,
    pub snapshot_path: PathBuf,
    pub settings:      ScrapeSettings,
}

impl PollerConfig {
    pub fn from_env() -> Result<Self> {
        let sources = match std::env::var("LIVE_SOURCES") {
            Ok(raw) if !raw.trim().is_empty() => {
                sources::parse_source_list(&raw).context("Invalid LIVE_SOURCES")?
            }
            _ => SourceId::ALL.to_vec(),
        };
        Ok(Self {
            interval:      Duration::from_secs(env_or("LIVE_POLL_INTERVAL_SECS", 30u64).max(1)),
            sources,
            snapshot_path: PathBuf::from(env_or("LIVE_SNAPSHOT_PATH", "data/live_events.json".to_string())),
            settings:      ScrapeSettings::from_env(),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PollerStatus {
    pub running:          bool,
    pub interval_secs:    u64,
    pub sources:          Vec<String>,
    pub cycles:           u64,
    pub started_at:       Option<String>,
    pub last_run:         Option<String>,
    pub last_event_count: usize,
    pub last_error:       Option<String>,
    pub suspended_count:  usize,
}

/// Answer to start/stop: whether anything changed plus the resulting status.
#[derive(Debug, Clone, Serialize)]
pub struct ControlOutcome {
    pub changed: bool,
    pub status:  PollerStatus,
}

/// Pushed to WS subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedUpdate {
    Snapshot {
        ts:              String,
        cycle:           u64,
        suspended_count: usize,
        events:          Vec<EventRecord>,
    },
    Suspension {
        ts:        String,
        key:       String,
        event:     String,
        suspended: bool,
        reason:    Option<String>,
    },
}

/// Runs one scrape round for the given sources.
pub type ScrapeFn = Arc<dyn Fn(Vec<SourceId>) -> BoxFuture<'static, Vec<ScrapeReport>> + Send + Sync>;

fn network_scraper(settings: ScrapeSettings) -> ScrapeFn {
    Arc::new(move |ids: Vec<SourceId>| {
        let settings = settings.clone();
        async move { sources::scrape_many(&ids, Mode::Live, &settings).await }.boxed()
    })
}

struct Inner {
    cfg:     PollerConfig,
    scrape:  ScrapeFn,
    logger:  Arc<EventLogger>,
    db_tx:   Option<mpsc::Sender<DbMsg>>,
    updates: broadcast::Sender<FeedUpdate>,
    status:  RwLock<PollerStatus>,
    events:  RwLock<Vec<EventRecord>>,
    tracker: Mutex<SuspensionTracker>,
    task:    Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct LivePoller {
    inner: Arc<Inner>,
}

impl LivePoller {
    pub fn new(cfg: PollerConfig, logger: Arc<EventLogger>, db_tx: Option<mpsc::Sender<DbMsg>>) -> Self {
        let scrape = network_scraper(cfg.settings.clone());
        Self::with_scraper(cfg, logger, db_tx, scrape)
    }

    pub fn with_scraper(
        cfg: PollerConfig,
        logger: Arc<EventLogger>,
        db_tx: Option<mpsc::Sender<DbMsg>>,
        scrape: ScrapeFn,
    ) -> Self {
        let status = PollerStatus {
            running:          false,
            interval_secs:    cfg.interval.as_secs(),
            sources:          cfg.sources.iter().map(|s| s.to_string()).collect(),
            cycles:           0,
            started_at:       None,
            last_run:         None,
            last_event_count: 0,
            last_error:       None,
            suspended_count:  0,
        };
        let (updates, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                cfg,
                scrape,
                logger,
                db_tx,
                updates,
                status:  RwLock::new(status),
                events:  RwLock::new(Vec::new()),
                tracker: Mutex::new(SuspensionTracker::new()),
                task:    Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.inner.updates.subscribe()
    }

    pub async fn status(&self) -> PollerStatus {
        self.inner.status.read().await.clone()
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.inner.events.read().await.clone()
    }

    /// Seed events and suspension state from the last snapshot file so a
    /// restart does not report every suspended market as new.
    pub async fn restore_snapshot(&self) -> usize {
        let restored = load_snapshot(&self.inner.cfg.snapshot_path);
        if restored.is_empty() {
            return 0;
        }
        {
            let mut tracker = self.inner.tracker.lock().await;
            for e in &restored {
                tracker.observe(&e.key(), e.suspended);
            }
        }
        let n = restored.len();
        let suspended = restored.iter().filter(|e| e.suspended).count();
        *self.inner.events.write().await = restored;
        {
            let mut st = self.inner.status.write().await;
            st.last_event_count = n;
            st.suspended_count = suspended;
        }
        info!("restored {n} events from {}", self.inner.cfg.snapshot_path.display());
        n
    }

    pub async fn start(&self) -> ControlOutcome {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return self.control_outcome("POLLER_START", false).await;
        }

        {
            let mut st = self.inner.status.write().await;
            st.running = true;
            st.started_at = Some(now_iso());
        }
        let poller = self.clone();
        *task = Some(tokio::spawn(async move { poller.run_loop().await }));
        drop(task);

        info!(
            "live poller started: every {}s over [{}]",
            self.inner.cfg.interval.as_secs(),
            self.status().await.sources.join(", ")
        );
        self.control_outcome("POLLER_START", true).await
    }

    pub async fn stop(&self) -> ControlOutcome {
        let handle = self.inner.task.lock().await.take();
        let changed = match handle {
            Some(h) if !h.is_finished() => {
                h.abort();
                true
            }
            _ => false,
        };
        self.inner.status.write().await.running = false;
        if changed {
            info!("live poller stopped");
        }
        self.control_outcome("POLLER_STOP", changed).await
    }

    async fn control_outcome(&self, event: &'static str, changed: bool) -> ControlOutcome {
        if let Err(e) = self.inner.logger.log(&PollerControlEvent { ts: now_iso(), event, changed }) {
            warn!("audit log write failed: {e}");
        }
        ControlOutcome { changed, status: self.status().await }
    }

    async fn run_loop(&self) {
        let mut ticker = tokio::time::interval(self.inner.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                warn!("live cycle failed: {e:#}");
                self.inner.status.write().await.last_error = Some(format!("{e:#}"));
            }
        }
    }

    /// One full cycle; returns the number of events in the new snapshot.
    pub async fn run_cycle(&self) -> Result<usize> {
        let reports = (self.inner.scrape)(self.inner.cfg.sources.clone()).await;
        self.apply_reports(reports).await
    }

    pub async fn apply_reports(&self, reports: Vec<ScrapeReport>) -> Result<usize> {
        let inner = &self.inner;
        let now = Utc::now();

        for r in &reports {
            sources::log_report(&inner.logger, r);
            self.send_db(DbMsg::Run(DbRunRow::from_report(now, r)));
        }

        let healthy = reports.iter().filter(|r| !r.is_failure()).count();
        let errors: Vec<String> = reports
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| format!("{}: {}", r.source, r.errors.join("; ")))
            .collect();

        // Every source down: keep the previous snapshot and tracker state.
        if healthy == 0 && !reports.is_empty() {
            let cycle = {
                let mut st = inner.status.write().await;
                st.cycles += 1;
                st.last_run = Some(now.to_rfc3339());
                st.last_error = Some(errors.join(" | "));
                st.cycles
            };
            warn!("cycle {cycle}: all {} sources failed, keeping previous snapshot", reports.len());
            return Ok(0);
        }

        let failed: HashSet<&str> = reports
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.source.as_str())
            .collect();

        let mut events = sources::merge_events(&reports);
        let fresh = events.len();
        if !failed.is_empty() {
            let previous = inner.events.read().await;
            events.extend(
                previous
                    .iter()
                    .filter(|e| failed.contains(e.bookmaker.as_str()))
                    .cloned(),
            );
            if events.len() > fresh {
                debug!("carrying {} events from failed sources", events.len() - fresh);
            }
        }
        let mut seen = HashSet::with_capacity(events.len());
        events.retain(|e| seen.insert(e.key()));

        let suspended_count = {
            let mut tracker = inner.tracker.lock().await;
            for e in &events {
                match tracker.observe(&e.key(), e.suspended) {
                    Transition::NowSuspended => self.record_transition(e, true),
                    Transition::Resumed => self.record_transition(e, false),
                    Transition::Appeared { .. } | Transition::Unchanged => {}
                }
            }
            let gone = tracker.retain_seen(&seen);
            if !gone.is_empty() {
                debug!("{} events left the live listing", gone.len());
            }
            tracker.suspended_count()
        };

        for e in events.iter().filter(|e| !failed.contains(e.bookmaker.as_str())) {
            self.send_db(DbMsg::Snapshot(DbSnapshotRow::from_record(now, e)));
        }

        let cycle = {
            let mut st = inner.status.write().await;
            st.cycles += 1;
            st.last_run = Some(now.to_rfc3339());
            st.last_event_count = events.len();
            st.suspended_count = suspended_count;
            st.last_error = (!errors.is_empty()).then(|| errors.join(" | "));
            st.cycles
        };

        let hb = PollerHeartbeatEvent {
            ts:                 now_iso(),
            event:              "POLLER_HEARTBEAT",
            cycle,
            poll_interval_secs: inner.cfg.interval.as_secs(),
            total_items:        events.len(),
            suspended_items:    suspended_count,
            healthy_sources:    healthy,
            total_sources:      reports.len(),
        };
        if let Err(e) = inner.logger.log(&hb) {
            warn!("audit log write failed: {e}");
        }
        info!(
            "cycle {cycle}: {} live events, {suspended_count} suspended, {healthy}/{} sources ok",
            events.len(),
            reports.len()
        );

        let n = events.len();
        write_json_file(&inner.cfg.snapshot_path, &events)
            .with_context(|| format!("write snapshot {}", inner.cfg.snapshot_path.display()))?;
        // No subscribers is fine.
        let _ = inner.updates.send(FeedUpdate::Snapshot {
            ts: now_iso(),
            cycle,
            suspended_count,
            events: events.clone(),
        });
        *inner.events.write().await = events;
        Ok(n)
    }

    fn record_transition(&self, e: &EventRecord, suspended: bool) {
        let inner = &self.inner;
        let event = if suspended { "MARKET_SUSPENDED" } else { "MARKET_RESUMED" };
        info!(
            "{event}: {} {} ({})",
            e.bookmaker,
            e.event,
            e.suspension_reason.as_deref().unwrap_or("-")
        );

        let change = SuspensionChangeEvent {
            ts:         now_iso(),
            event,
            bookmaker:  e.bookmaker.clone(),
            event_id:   e.event_id.clone(),
            match_name: e.event.clone(),
            reason:     e.suspension_reason.clone(),
            home_odds:  e.home_odds,
            draw_odds:  e.draw_odds,
            away_odds:  e.away_odds,
        };
        if let Err(err) = inner.logger.log(&change) {
            warn!("audit log write failed: {err}");
        }

        self.send_db(DbMsg::Suspension(DbSuspensionRow {
            ts:        Utc::now(),
            bookmaker: e.bookmaker.clone(),
            event_id:  e.event_id.clone(),
            event:     e.event.clone(),
            suspended,
            reason:    e.suspension_reason.clone(),
        }));

        let _ = inner.updates.send(FeedUpdate::Suspension {
            ts:        now_iso(),
            key:       e.key(),
            event:     e.event.clone(),
            suspended,
            reason:    e.suspension_reason.clone(),
        });
    }

    fn send_db(&self, msg: DbMsg) {
        if let Some(tx) = &self.inner.db_tx {
            if tx.try_send(msg).is_err() {
                debug!("history db queue full or closed, dropping row");
            }
        }
    }
}

/// Records from a snapshot file in any historical shape; unreadable files
/// and entries are skipped.
pub fn load_snapshot(path: &Path) -> Vec<EventRecord> {
    if !path.exists() {
        return Vec::new();
    }
    let value = match read_json_file(path) {
        Ok(v) => v,
        Err(e) => {
            warn!("ignoring snapshot: {e:#}");
            return Vec::new();
        }
    };
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("events") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .iter()
        .filter_map(|v| EventRecord::from_legacy(v, "unknown"))
        .collect()
}
