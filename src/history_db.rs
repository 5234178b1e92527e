use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use odds_core::{EventRecord, ScrapeReport};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DbRunRow {
    pub ts:         DateTime<Utc>,
    pub source:     String,
    pub mode:       String,
    pub events:     i64,
    pub suspended:  i64,
    pub pages:      i64,
    pub skipped:    i64,
    pub errors:     Option<String>,
    pub timed_out:  bool,
    pub elapsed_ms: i64,
}

impl DbRunRow {
    pub fn from_report(ts: DateTime<Utc>, r: &ScrapeReport) -> Self {
        Self {
            ts,
            source:     r.source.clone(),
            mode:       r.mode.to_string(),
            events:     r.events.len() as i64,
            suspended:  r.suspended_count() as i64,
            pages:      r.pages as i64,
            skipped:    r.skipped as i64,
            errors:     (!r.errors.is_empty()).then(|| r.errors.join("; ")),
            timed_out:  r.timed_out,
            elapsed_ms: r.elapsed_ms as i64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbSnapshotRow {
    pub ts:           DateTime<Utc>,
    pub bookmaker:    String,
    pub event_id:     String,
    pub match_key:    String,
    pub event:        String,
    pub country:      String,
    pub tournament:   String,
    pub home_odds:    Option<f64>,
    pub draw_odds:    Option<f64>,
    pub away_odds:    Option<f64>,
    /// Overround of the 1X2 prices, only when all three are quoted.
    pub margin_pct:   Option<f64>,
    pub suspended:    bool,
    pub start_time:   Option<String>,
    pub payload_json: String,
}

impl DbSnapshotRow {
    pub fn from_record(ts: DateTime<Utc>, e: &EventRecord) -> Self {
        Self {
            ts,
            bookmaker:    e.bookmaker.clone(),
            event_id:     e.event_id.clone(),
            match_key:    e.match_key(),
            event:        e.event.clone(),
            country:      e.country.clone(),
            tournament:   e.tournament.clone(),
            home_odds:    e.home_odds,
            draw_odds:    e.draw_odds,
            away_odds:    e.away_odds,
            margin_pct:   e.odds().margin_pct(),
            suspended:    e.suspended,
            start_time:   e.start_time.clone(),
            payload_json: serde_json::to_string(e).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbSuspensionRow {
    pub ts:        DateTime<Utc>,
    pub bookmaker: String,
    pub event_id:  String,
    pub event:     String,
    /// true = market went suspended, false = resumed
    pub suspended: bool,
    pub reason:    Option<String>,
}

#[derive(Debug)]
pub enum DbMsg {
    Run(DbRunRow),
    Snapshot(DbSnapshotRow),
    Suspension(DbSuspensionRow),
}

pub fn spawn_db_writer(cfg: DbConfig) -> mpsc::Sender<DbMsg> {
    let (tx, mut rx) = mpsc::channel::<DbMsg>(10_000);

    std::thread::spawn(move || {
        let result: Result<()> = (|| {
            let conn = open(&cfg.path)?;
            info!("history db ready at {}", cfg.path);

            while let Some(msg) = rx.blocking_recv() {
                if let Err(e) = apply_msg(&conn, msg) {
                    // a failed write must not stall the poller
                    warn!("[history-db] write failed: {e:#}");
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            warn!("[history-db] fatal: {e:#}");
        }
    });

    tx
}

/// Open (creating parent dirs) with WAL and the schema in place.
pub fn open(path: impl AsRef<Path>) -> Result<Connection> {
    let db_path = path.as_ref();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            source TEXT NOT NULL,
            mode TEXT NOT NULL,
            events INTEGER NOT NULL,
            suspended INTEGER NOT NULL,
            pages INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            errors TEXT,
            timed_out INTEGER NOT NULL,
            elapsed_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_runs_ts ON scrape_runs(ts);

        CREATE TABLE IF NOT EXISTS odds_snapshots (
            bookmaker TEXT NOT NULL,
            event_id TEXT NOT NULL,
            ts TEXT NOT NULL,
            match_key TEXT NOT NULL,
            event TEXT NOT NULL,
            country TEXT NOT NULL,
            tournament TEXT NOT NULL,
            home_odds REAL,
            draw_odds REAL,
            away_odds REAL,
            margin_pct REAL,
            suspended INTEGER NOT NULL,
            start_time TEXT,
            payload_json TEXT NOT NULL,
            PRIMARY KEY (bookmaker, event_id)
        );

        CREATE INDEX IF NOT EXISTS idx_snap_match ON odds_snapshots(match_key);

        CREATE TABLE IF NOT EXISTS suspension_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            bookmaker TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event TEXT NOT NULL,
            suspended INTEGER NOT NULL,
            reason TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_susp_event ON suspension_events(bookmaker, event_id);
        "#,
    )
    .context("init schema")?;

    Ok(())
}

pub fn apply_msg(conn: &Connection, msg: DbMsg) -> Result<()> {
    match msg {
        DbMsg::Run(r) => {
            conn.execute(
                r#"
                INSERT INTO scrape_runs(ts, source, mode, events, suspended, pages, skipped, errors, timed_out, elapsed_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    r.ts.to_rfc3339(),
                    r.source,
                    r.mode,
                    r.events,
                    r.suspended,
                    r.pages,
                    r.skipped,
                    r.errors,
                    r.timed_out as i64,
                    r.elapsed_ms,
                ],
            )?;
        }
        DbMsg::Snapshot(r) => {
            conn.execute(
                r#"
                INSERT INTO odds_snapshots(bookmaker, event_id, ts, match_key, event, country, tournament, home_odds, draw_odds, away_odds, margin_pct, suspended, start_time, payload_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(bookmaker, event_id) DO UPDATE SET
                    ts=excluded.ts,
                    match_key=excluded.match_key,
                    event=excluded.event,
                    country=excluded.country,
                    tournament=excluded.tournament,
                    home_odds=excluded.home_odds,
                    draw_odds=excluded.draw_odds,
                    away_odds=excluded.away_odds,
                    margin_pct=excluded.margin_pct,
                    suspended=excluded.suspended,
                    start_time=excluded.start_time,
                    payload_json=excluded.payload_json
                "#,
                params![
                    r.bookmaker,
                    r.event_id,
                    r.ts.to_rfc3339(),
                    r.match_key,
                    r.event,
                    r.country,
                    r.tournament,
                    r.home_odds,
                    r.draw_odds,
                    r.away_odds,
                    r.margin_pct,
                    r.suspended as i64,
                    r.start_time,
                    r.payload_json,
                ],
            )?;
        }
        DbMsg::Suspension(r) => {
            conn.execute(
                "INSERT INTO suspension_events(ts, bookmaker, event_id, event, suspended, reason) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![r.ts.to_rfc3339(), r.bookmaker, r.event_id, r.event, r.suspended as i64, r.reason],
            )?;
        }
    }

    Ok(())
}

// ── Stats ────────────────────────────────────────────────────────────────────

pub const TABLES: [&str; 3] = ["scrape_runs", "odds_snapshots", "suspension_events"];

#[derive(Debug, Clone, PartialEq)]
pub struct LastRun {
    pub ts:        String,
    pub source:    String,
    pub mode:      String,
    pub events:    i64,
    pub suspended: i64,
    pub errors:    Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryStats {
    pub counts:         Vec<(&'static str, i64)>,
    /// Suspended events in each bookmaker's most recent listing; rows left
    /// behind by finished matches are not counted.
    pub suspended_now:  i64,
    pub last_run:       Option<LastRun>,
}

pub fn read_stats(conn: &Connection) -> Result<HistoryStats> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for t in TABLES {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
            .with_context(|| format!("count {t}"))?;
        counts.push((t, count));
    }

    let suspended_now: i64 = conn
        .query_row(
            r#"
            SELECT COUNT(1) FROM odds_snapshots s
            WHERE s.suspended = 1
              AND s.ts = (SELECT MAX(ts) FROM odds_snapshots WHERE bookmaker = s.bookmaker)
            "#,
            [],
            |r| r.get(0),
        )
        .context("count suspended snapshots")?;

    let last_run = conn
        .query_row(
            "SELECT ts, source, mode, events, suspended, errors FROM scrape_runs ORDER BY id DESC LIMIT 1",
            [],
            |r| {
                Ok(LastRun {
                    ts:        r.get(0)?,
                    source:    r.get(1)?,
                    mode:      r.get(2)?,
                    events:    r.get(3)?,
                    suspended: r.get(4)?,
                    errors:    r.get(5)?,
                })
            },
        )
        .optional()
        .context("read last run")?;

    Ok(HistoryStats { counts, suspended_now, last_run })
}

#[cfg(test)]
mod tests {
    use super::*;
    use odds_core::Mode;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(home_odds: f64, suspended: bool) -> EventRecord {
        let mut r = EventRecord::from_legacy(
            &json!({ "eventId": "42", "bookmaker": "sportybet", "event": "Hearts - Kotoko", "country": "Ghana" }),
            "sportybet",
        )
        .unwrap();
        r.home_odds = Some(home_odds);
        r.suspended = suspended;
        r
    }

    #[test]
    fn snapshot_upserts_per_bookmaker_and_event() {
        let conn = memory_db();
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(Utc::now(), &record(2.1, false)))).unwrap();
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(Utc::now(), &record(2.4, true)))).unwrap();

        let (n, odds, susp, key): (i64, f64, i64, String) = conn
            .query_row(
                "SELECT COUNT(1), MAX(home_odds), MAX(suspended), MAX(match_key) FROM odds_snapshots",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(odds, 2.4);
        assert_eq!(susp, 1);
        assert_eq!(key, "hearts_vs_kotoko");
    }

    #[test]
    fn snapshot_stores_margin_only_for_full_prices() {
        let conn = memory_db();
        let mut full = record(2.0, false);
        full.draw_odds = Some(4.0);
        full.away_odds = Some(4.0);
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(Utc::now(), &full))).unwrap();
        let margin: Option<f64> = conn
            .query_row("SELECT margin_pct FROM odds_snapshots", [], |r| r.get(0))
            .unwrap();
        assert!((margin.unwrap() - 0.0).abs() < 1e-9);

        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(Utc::now(), &record(2.0, true)))).unwrap();
        let margin: Option<f64> = conn
            .query_row("SELECT margin_pct FROM odds_snapshots", [], |r| r.get(0))
            .unwrap();
        assert_eq!(margin, None);
    }

    #[test]
    fn suspended_now_ignores_rows_from_older_listings() {
        let conn = memory_db();
        let t1 = Utc::now() - chrono::Duration::seconds(60);
        let t2 = Utc::now();

        let mut finished = record(1.5, true);
        finished.event_id = "43".into();
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(t1, &finished))).unwrap();
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(t1, &record(1.9, true)))).unwrap();
        assert_eq!(read_stats(&conn).unwrap().suspended_now, 2);

        // next cycle only lists event 42
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(t2, &record(1.9, true)))).unwrap();
        let stats = read_stats(&conn).unwrap();
        assert_eq!(stats.counts[1], ("odds_snapshots", 2));
        assert_eq!(stats.suspended_now, 1);
    }

    #[test]
    fn suspension_events_append() {
        let conn = memory_db();
        for suspended in [true, false, true] {
            apply_msg(
                &conn,
                DbMsg::Suspension(DbSuspensionRow {
                    ts: Utc::now(),
                    bookmaker: "betpawa-gh".into(),
                    event_id: "7".into(),
                    event: "A - B".into(),
                    suspended,
                    reason: suspended.then(|| "all odds zero".to_string()),
                }),
            )
            .unwrap();
        }
        let stats = read_stats(&conn).unwrap();
        assert_eq!(stats.counts[2], ("suspension_events", 3));
    }

    #[test]
    fn stats_report_last_run() {
        let conn = memory_db();
        assert!(read_stats(&conn).unwrap().last_run.is_none());

        let mut ok = ScrapeReport::new("sportybet", Mode::Live);
        ok.events = vec![record(1.9, true)];
        let failed = ScrapeReport::failed("betika-ke", Mode::Live, &anyhow::anyhow!("HTTP 503"));
        apply_msg(&conn, DbMsg::Run(DbRunRow::from_report(Utc::now(), &ok))).unwrap();
        apply_msg(&conn, DbMsg::Run(DbRunRow::from_report(Utc::now(), &failed))).unwrap();
        apply_msg(&conn, DbMsg::Snapshot(DbSnapshotRow::from_record(Utc::now(), &ok.events[0]))).unwrap();

        let stats = read_stats(&conn).unwrap();
        assert_eq!(stats.counts[0], ("scrape_runs", 2));
        assert_eq!(stats.suspended_now, 1);

        let last = stats.last_run.unwrap();
        assert_eq!(last.source, "betika-ke");
        assert_eq!(last.events, 0);
        assert_eq!(last.errors.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn open_creates_file_and_parent_dir() {
        let dir = std::env::temp_dir().join(format!("oddscrape-history-{}", std::process::id()));
        let path = dir.join("nested").join("history.db");
        let conn = open(&path).unwrap();
        assert_eq!(read_stats(&conn).unwrap().counts.len(), 3);
        drop(conn);
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
