/// oddscrape — SportyBet scraper
///
/// factsCenter API, country code in the path:
///   upcoming: GET /api/{cc}/factsCenter/pcUpcomingEvents?sportId=sr:sport:1&marketId=...&pageSize=100&pageNum=N
///   live:     GET /api/{cc}/factsCenter/liveOrPrematchEvents?sportId=sr:sport:1
///
/// Both answer `{ bizCode, data: ... }` with tournaments either under
/// `data.tournaments` or directly as the `data` array. Market id "1" is 1X2,
/// outcomes are labelled by `desc` (Home / Draw / Away).

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use odds_core::extract::{as_i64_loose, first_scalar, first_str, flatten_tournaments, sniff_array};
use odds_core::fetch::build_client;
use odds_core::ids::normalize_event_id;
use odds_core::time::start_time_string;
use odds_core::{
    EventRecord, HttpFetcher, LiveStatus, Mode, ScrapeReport, ScrapeSettings, SuspensionSignals, ThreeWay,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const BOOKMAKER: &str = "sportybet";
pub const BASE_URL: &str = "https://www.sportybet.com";
pub const FOOTBALL: &str = "sr:sport:1";
pub const MARKET_1X2: &str = "1";
pub const PAGE_SIZE: u32 = 100;

/// 1X2, over/under, double chance, BTTS and friends; only "1" is mapped.
const UPCOMING_MARKETS: &str = "1,18,10,29,11,26,36,14,60100";

const TOURNAMENT_PATHS: &[&str] = &["/data/tournaments", "/data", "/tournaments"];

// ── Request builder ──────────────────────────────────────────────────────────

pub fn upcoming_url(base_url: &str, country: &str, page: u32) -> Result<Url> {
    let base = format!("{base_url}/api/{country}/factsCenter/pcUpcomingEvents");
    Url::parse_with_params(
        &base,
        &[
            ("sportId", FOOTBALL.to_string()),
            ("marketId", UPCOMING_MARKETS.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("pageNum", page.to_string()),
            ("_t", Utc::now().timestamp_millis().to_string()),
        ],
    )
    .context("SportyBet upcoming URL")
}

pub fn live_url(base_url: &str, country: &str) -> Result<Url> {
    let base = format!("{base_url}/api/{country}/factsCenter/liveOrPrematchEvents");
    Url::parse_with_params(
        &base,
        &[
            ("sportId", FOOTBALL.to_string()),
            ("_t", Utc::now().timestamp_millis().to_string()),
        ],
    )
    .context("SportyBet live URL")
}

pub fn headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h
}

// ── Shape sniffing ───────────────────────────────────────────────────────────

/// `(tournament, event)` pairs from any known envelope. When the array holds
/// events instead of tournaments, the tournament slot is `None`.
pub fn events_of(body: &Value) -> (Vec<(Option<&Value>, &Value)>, Option<&'static str>) {
    let Some(sniffed) = sniff_array(body, TOURNAMENT_PATHS) else {
        return (Vec::new(), None);
    };
    let holds_tournaments = sniffed.items.iter().any(|t| t.get("events").is_some());
    let pairs = if holds_tournaments {
        flatten_tournaments(sniffed.items)
            .into_iter()
            .map(|(t, e)| (Some(t), e))
            .collect()
    } else {
        sniffed.items.iter().map(|e| (None, e)).collect()
    };
    (pairs, Some(sniffed.path))
}

// ── Field mapper ─────────────────────────────────────────────────────────────

pub fn find_1x2_market(event: &Value) -> Option<&Value> {
    event
        .get("markets")?
        .as_array()?
        .iter()
        .find(|m| first_scalar(m, &["/id"]).as_deref() == Some(MARKET_1X2))
}

/// "67:12" → 67
fn played_minute(played: &str) -> Option<u32> {
    played.split(':').next()?.trim().parse().ok()
}

fn live_status(event: &Value) -> LiveStatus {
    LiveStatus {
        status: first_str(event, &["/matchStatus"])
            .map(str::to_string)
            .or_else(|| first_scalar(event, &["/status"])),
        period: first_scalar(event, &["/period"]),
        minute: first_str(event, &["/playedSeconds"]).and_then(played_minute),
        score:  first_str(event, &["/setScore"]).map(str::to_string),
    }
}

fn suspension_signals(market: Option<&Value>, odds: ThreeWay) -> SuspensionSignals {
    let Some(m) = market else {
        return SuspensionSignals { market_count: Some(0), odds, ..Default::default() };
    };
    let outcomes = m.get("outcomes").and_then(Value::as_array);
    let all_inactive = outcomes.is_some_and(|os| {
        !os.is_empty() && os.iter().all(|o| o.get("isActive").and_then(as_i64_loose) == Some(0))
    });
    SuspensionSignals {
        flagged: m.get("status").and_then(as_i64_loose).is_some_and(|s| s != 0) || all_inactive,
        reason: first_str(m, &["/suspendedReason"]).map(str::to_string),
        market_count: None,
        odds,
    }
}

/// Upcoming events need at least one price; live events are kept and
/// flagged so suspensions stay visible.
pub fn map_event(tournament: Option<&Value>, event: &Value, mode: Mode) -> Result<EventRecord> {
    let original_id = first_scalar(event, &["/eventId"]).context("event without eventId")?;
    let home_team = first_str(event, &["/homeTeamName"]).context("event without homeTeamName")?;
    let away_team = first_str(event, &["/awayTeamName"]).context("event without awayTeamName")?;

    let market = find_1x2_market(event);
    if market.is_none() && mode == Mode::Upcoming {
        return Err(anyhow!("no 1X2 market on {original_id}"));
    }

    let odds = ThreeWay::from_outcomes(
        market
            .and_then(|m| m.get("outcomes"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|o| Some((o.get("desc")?.as_str()?, o.get("odds")?))),
    );
    if odds.is_empty() && mode == Mode::Upcoming {
        return Err(anyhow!("zero odds on {original_id}"));
    }

    let tournament_name = tournament
        .and_then(|t| first_str(t, &["/name"]))
        .or_else(|| first_str(event, &["/sport/category/tournament/name", "/tournament/name"]))
        .unwrap_or("Unknown Tournament");

    let mut record = EventRecord {
        event_id: normalize_event_id(&original_id),
        original_event_id: Some(original_id),
        bookmaker: BOOKMAKER.to_string(),
        country: first_str(event, &["/sport/category/name"]).unwrap_or("Unknown").to_string(),
        tournament: tournament_name.to_string(),
        event: format!("{home_team} - {away_team}"),
        home_team: home_team.to_string(),
        away_team: away_team.to_string(),
        market: "1X2".to_string(),
        home_odds: None,
        draw_odds: None,
        away_odds: None,
        start_time: event.get("estimateStartTime").and_then(start_time_string),
        suspended: false,
        suspension_reason: None,
        market_count: event.get("totalMarketSize").and_then(Value::as_u64),
        live: (mode == Mode::Live).then(|| live_status(event)),
    };
    record.set_odds(odds);
    record.apply_suspension(&suspension_signals(market, odds).assess());
    Ok(record)
}

#[derive(Debug, Default)]
pub struct PageOutcome {
    pub records:     Vec<EventRecord>,
    pub tournaments: usize,
    pub raw_count:   usize,
    pub skipped:     usize,
    pub shape:       Option<&'static str>,
}

pub fn map_page(body: &Value, mode: Mode) -> PageOutcome {
    let (pairs, shape) = events_of(body);
    let mut out = PageOutcome {
        tournaments: shape
            .and_then(|p| body.pointer(p))
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        raw_count: pairs.len(),
        shape,
        ..Default::default()
    };
    for (tournament, event) in pairs {
        match map_event(tournament, event, mode) {
            Ok(r) => out.records.push(r),
            Err(e) => {
                debug!("sportybet skipping event: {:#}", e);
                out.skipped += 1;
            }
        }
    }
    out
}

// ── Scraper ──────────────────────────────────────────────────────────────────

pub struct SportybetScraper {
    client:   reqwest::Client,
    settings: ScrapeSettings,
    base_url: String,
}

impl SportybetScraper {
    pub fn new(settings: ScrapeSettings) -> Self {
        Self {
            client: build_client(),
            settings,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the scraper at another host (mirror, local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn country(&self) -> &str {
        &self.settings.sportybet_country
    }

    pub async fn scrape(&self, mode: Mode) -> ScrapeReport {
        let fetcher = HttpFetcher::with_client(self.client.clone(), &self.settings);
        let mut report = match mode {
            Mode::Upcoming => self.scrape_upcoming(&fetcher).await,
            Mode::Live => self.scrape_live(&fetcher).await,
        };

        report.dedup_events();
        report.elapsed_ms = fetcher.deadline().elapsed().as_millis() as u64;
        info!(
            "sportybet/{}: {} {} events ({} suspended, {} skipped) from {} pages in {}ms",
            self.country(),
            report.events.len(),
            mode,
            report.suspended_count(),
            report.skipped,
            report.pages,
            report.elapsed_ms
        );
        report
    }

    async fn scrape_live(&self, fetcher: &HttpFetcher) -> ScrapeReport {
        let mut report = ScrapeReport::new(BOOKMAKER, Mode::Live);
        let body = match live_url(&self.base_url, self.country()) {
            Ok(url) => fetcher.get_json(&url, &headers()).await,
            Err(e) => Err(e),
        };
        match body {
            Ok(body) => {
                report.pages = 1;
                let outcome = map_page(&body, Mode::Live);
                match outcome.shape {
                    None => report
                        .errors
                        .push(format!("unrecognised live response shape (bizCode {})", biz_code(&body))),
                    Some(_) if outcome.raw_count == 0 => info!("sportybet: nothing in play right now"),
                    Some(_) => {}
                }
                report.skipped = outcome.skipped;
                report.shape = outcome.shape;
                report.events = outcome.records;
            }
            Err(e) => {
                warn!("sportybet live fetch failed: {e:#}");
                report.timed_out = fetcher.deadline().expired();
                report.errors.push(format!("{e:#}"));
            }
        }
        report
    }

    /// Page 1 may be invalid and is retried as page 2; any later invalid
    /// page ends the walk. An empty tournament list is the end of the
    /// listing, not an error.
    async fn scrape_upcoming(&self, fetcher: &HttpFetcher) -> ScrapeReport {
        let mut report = ScrapeReport::new(BOOKMAKER, Mode::Upcoming);
        let hdrs = headers();
        info!("sportybet: will fetch up to {} pages", self.settings.max_pages);

        for page in 1..=self.settings.max_pages {
            if fetcher.deadline().expired() {
                warn!("sportybet: runtime limit reached, stopping after {} pages", page - 1);
                report.timed_out = true;
                break;
            }

            let body = match upcoming_url(&self.base_url, self.country(), page) {
                Ok(url) => fetcher.get_json(&url, &hdrs).await,
                Err(e) => Err(e),
            };

            let outcome = match body {
                Ok(body) => {
                    report.pages += 1;
                    let outcome = map_page(&body, Mode::Upcoming);
                    if outcome.shape.is_none() {
                        let msg = format!("page {page}: no tournaments (bizCode {})", biz_code(&body));
                        warn!("sportybet {msg}");
                        report.errors.push(msg);
                        if page > 1 {
                            break;
                        }
                        continue;
                    }
                    outcome
                }
                Err(e) => {
                    warn!("sportybet page {page} failed: {e:#}");
                    report.errors.push(format!("page {page}: {e:#}"));
                    if fetcher.deadline().expired() {
                        report.timed_out = true;
                    }
                    if page > 1 {
                        break;
                    }
                    continue;
                }
            };

            info!(
                "sportybet: page {page} has {} tournaments, {} events",
                outcome.tournaments, outcome.raw_count
            );
            if outcome.raw_count == 0 || outcome.tournaments == 0 {
                info!("sportybet: no more events after page {page}, stopping pagination");
                break;
            }
            report.skipped += outcome.skipped;
            report.shape = outcome.shape;
            report.events.extend(outcome.records);
        }

        // Events were found; errors from a bad first page are noise then.
        if !report.events.is_empty() {
            report.errors.clear();
        }
        report
    }
}

fn biz_code(body: &Value) -> String {
    first_scalar(body, &["/bizCode"]).unwrap_or_else(|| "?".to_string())
}
