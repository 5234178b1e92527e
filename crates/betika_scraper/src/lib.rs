/// oddscrape — Betika Kenya scraper
///
/// GET https://api.betika.com/v1/uo/matches?page=N&limit=50&sport_id=14&sub_type_id=1
/// GET https://live.betika.com/v1/uo/matches?page=N&limit=50&sport_id=14&sub_type_id=1
///
/// Two payloads are seen in the wild:
///   flat:   { data: [ { match_id, home_team, away_team, home_odd, neutral_odd, away_odd, ... } ], meta: { total } }
///   nested: { data: { matches: [ { id, home: {name}, away: {name}, competition: {...}, markets: [ {selections} ] } ] } }

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use odds_core::extract::{as_i64_loose, first_scalar, first_str, is_truthy, sniff_array};
use odds_core::fetch::build_client;
use odds_core::odds::parse_odds;
use odds_core::time::{format_start_time, start_time_string};
use odds_core::{
    EventRecord, HttpFetcher, LiveStatus, Mode, ScrapeReport, ScrapeSettings, SuspensionSignals, ThreeWay,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const BOOKMAKER: &str = "betika-ke";
pub const FOOTBALL: u32 = 14;
pub const PAGE_SIZE: u32 = 50;

/// Flat `start_time` strings are Nairobi local time.
const NAIROBI_OFFSET_SECS: i32 = 3 * 3600;

const MATCH_PATHS: &[&str] = &["/data/matches", "/data", "/matches"];

// ── Request builder ──────────────────────────────────────────────────────────

/// Upcoming and live listings sit on different hosts.
pub fn base_url(mode: Mode) -> &'static str {
    match mode {
        Mode::Upcoming => "https://api.betika.com",
        Mode::Live => "https://live.betika.com",
    }
}

pub fn page_url(base_url: &str, mode: Mode, page: u32) -> Result<Url> {
    let base = format!("{base_url}/v1/uo/matches");
    let mut params = vec![
        ("page", page.to_string()),
        ("limit", PAGE_SIZE.to_string()),
        ("sport_id", FOOTBALL.to_string()),
        ("sub_type_id", "1".to_string()),
    ];
    if mode == Mode::Upcoming {
        params.push(("tab", "upcoming".to_string()));
        params.push(("sort_id", "2".to_string()));
    }
    Url::parse_with_params(&base, &params).context("Betika URL")
}

pub fn headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h.insert(ORIGIN, HeaderValue::from_static("https://www.betika.com"));
    h.insert(REFERER, HeaderValue::from_static("https://www.betika.com/"));
    h
}

// ── Flat shape ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FlatMatch {
    #[serde(default)]
    parent_match_id:  Option<Value>,
    #[serde(default)]
    match_id:         Option<Value>,
    home_team:        String,
    away_team:        String,
    #[serde(default)]
    competition_name: Option<String>,
    #[serde(default)]
    category:         Option<String>,
    #[serde(default)]
    start_time:       Option<String>,
    #[serde(default)]
    home_odd:         Option<Value>,
    #[serde(default)]
    neutral_odd:      Option<Value>,
    #[serde(default)]
    away_odd:         Option<Value>,
    #[serde(default)]
    side_bets:        Option<Value>,
    #[serde(default)]
    bet_status:       Option<Value>,
    #[serde(default)]
    match_status:     Option<String>,
    #[serde(default)]
    match_time:       Option<Value>,
    #[serde(default)]
    current_score:    Option<String>,
}

/// "2025-04-27 15:00:00" in Nairobi time → UTC "2025-04-27 12:00".
fn nairobi_start_time(raw: &str) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let eat = FixedOffset::east_opt(NAIROBI_OFFSET_SECS)?;
    let local = eat.from_local_datetime(&naive).single()?;
    Some(format_start_time(local.with_timezone(&Utc)))
}

fn map_flat(v: &Value, mode: Mode) -> Result<EventRecord> {
    let m: FlatMatch = serde_json::from_value(v.clone()).context("flat match")?;
    let event_id = [&m.parent_match_id, &m.match_id]
        .into_iter()
        .flatten()
        .find_map(|id| first_scalar(id, &[""]))
        .context("match without id")?;

    let price = |p: &Option<Value>| p.as_ref().and_then(parse_odds);
    let odds = ThreeWay {
        home: price(&m.home_odd),
        draw: price(&m.neutral_odd),
        away: price(&m.away_odd),
    };
    if odds.is_empty() && mode == Mode::Upcoming {
        return Err(anyhow!("zero odds on {event_id}"));
    }

    let live = (mode == Mode::Live).then(|| LiveStatus {
        status: m.match_status.clone(),
        period: None,
        minute: m.match_time.as_ref().and_then(as_i64_loose).and_then(|n| u32::try_from(n).ok()),
        score:  m.current_score.clone(),
    });

    let signals = SuspensionSignals {
        // bet_status other than "active"/1 means the market is closed
        flagged: m.bet_status.as_ref().is_some_and(|s| match s {
            Value::String(s) => !s.eq_ignore_ascii_case("active"),
            other => as_i64_loose(other).is_some_and(|n| n != 1),
        }),
        reason: None,
        market_count: m.side_bets.as_ref().and_then(Value::as_u64).map(|n| n + 1),
        odds,
    };

    let mut record = EventRecord {
        event_id,
        original_event_id: None,
        bookmaker: BOOKMAKER.to_string(),
        country: m.category.clone().unwrap_or_else(|| "Kenya".to_string()),
        tournament: m.competition_name.clone().unwrap_or_else(|| "Unknown Tournament".to_string()),
        event: format!("{} - {}", m.home_team, m.away_team),
        home_team: m.home_team,
        away_team: m.away_team,
        market: "1X2".to_string(),
        home_odds: None,
        draw_odds: None,
        away_odds: None,
        start_time: m.start_time.as_deref().and_then(nairobi_start_time),
        suspended: false,
        suspension_reason: None,
        market_count: signals.market_count,
        live,
    };
    record.set_odds(odds);
    record.apply_suspension(&signals.assess());
    Ok(record)
}

// ── Nested shape ─────────────────────────────────────────────────────────────

fn map_nested(v: &Value, mode: Mode) -> Result<EventRecord> {
    let event_id = first_scalar(v, &["/id", "/match_id"]).context("match without id")?;
    let home_team = first_str(v, &["/home/name"]).context("match without home")?;
    let away_team = first_str(v, &["/away/name"]).context("match without away")?;

    let market = v.pointer("/markets/0");
    let odds = ThreeWay::from_outcomes(
        market
            .and_then(|m| m.get("selections"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|s| Some((s.get("name")?.as_str()?, s.get("odd")?))),
    );
    if odds.is_empty() && mode == Mode::Upcoming {
        return Err(anyhow!("zero odds on {event_id}"));
    }

    let market_count = market.is_none().then_some(0);
    let signals = SuspensionSignals {
        flagged: market.is_some_and(|m| is_truthy(m.get("suspended"))),
        reason: None,
        market_count,
        odds,
    };

    let mut record = EventRecord {
        event_id,
        original_event_id: None,
        bookmaker: BOOKMAKER.to_string(),
        country: first_str(v, &["/competition/category/name"]).unwrap_or("Kenya").to_string(),
        tournament: first_str(v, &["/competition/name"]).unwrap_or("Unknown Tournament").to_string(),
        event: format!("{home_team} - {away_team}"),
        home_team: home_team.to_string(),
        away_team: away_team.to_string(),
        market: "1X2".to_string(),
        home_odds: None,
        draw_odds: None,
        away_odds: None,
        start_time: v.get("time").and_then(start_time_string),
        suspended: false,
        suspension_reason: None,
        market_count,
        live: (mode == Mode::Live).then(LiveStatus::default),
    };
    record.set_odds(odds);
    record.apply_suspension(&signals.assess());
    Ok(record)
}

// ── Page mapping ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PageOutcome {
    pub records:   Vec<EventRecord>,
    pub raw_count: usize,
    pub skipped:   usize,
    pub shape:     Option<&'static str>,
    /// `meta.total` when the site reports it.
    pub total:     Option<u64>,
}

pub fn map_page(body: &Value, mode: Mode) -> PageOutcome {
    let mut out = PageOutcome {
        total: body.pointer("/meta/total").and_then(as_i64_loose).and_then(|n| u64::try_from(n).ok()),
        ..Default::default()
    };
    let Some(sniffed) = sniff_array(body, MATCH_PATHS) else {
        return out;
    };
    out.shape = Some(sniffed.path);
    out.raw_count = sniffed.items.len();

    for item in sniffed.items {
        let mapped = if item.get("home").is_some_and(Value::is_object) {
            map_nested(item, mode)
        } else {
            map_flat(item, mode)
        };
        match mapped {
            Ok(r) => out.records.push(r),
            Err(e) => {
                debug!("betika skipping match: {:#}", e);
                out.skipped += 1;
            }
        }
    }
    out
}

// ── Scraper ──────────────────────────────────────────────────────────────────

pub struct BetikaScraper {
    client:   reqwest::Client,
    settings: ScrapeSettings,
    /// Replaces both hosts when set.
    base_url: Option<String>,
}

impl BetikaScraper {
    pub fn new(settings: ScrapeSettings) -> Self {
        Self {
            client: build_client(),
            settings,
            base_url: None,
        }
    }

    /// Point the scraper at another host (mirror, local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub async fn scrape(&self, mode: Mode) -> ScrapeReport {
        let fetcher = HttpFetcher::with_client(self.client.clone(), &self.settings);
        let mut report = ScrapeReport::new(BOOKMAKER, mode);
        let hdrs = headers();
        let base = self.base_url.as_deref().unwrap_or_else(|| base_url(mode));

        for page in 1..=self.settings.max_pages {
            if fetcher.deadline().expired() {
                warn!("betika: runtime limit reached after {} pages", page - 1);
                report.timed_out = true;
                break;
            }

            let body = match page_url(base, mode, page) {
                Ok(url) => fetcher.get_json(&url, &hdrs).await,
                Err(e) => Err(e),
            };
            let body = match body {
                Ok(b) => b,
                Err(e) => {
                    warn!("betika page {page} failed: {e:#}");
                    report.errors.push(format!("page {page}: {e:#}"));
                    report.timed_out |= fetcher.deadline().expired();
                    break;
                }
            };
            report.pages += 1;

            let outcome = map_page(&body, mode);
            if outcome.shape.is_none() {
                report.errors.push(format!("page {page}: unrecognised response shape"));
                break;
            }
            debug!("betika page {page}: {} raw, {} mapped", outcome.raw_count, outcome.records.len());

            let raw = outcome.raw_count;
            report.skipped += outcome.skipped;
            report.shape = outcome.shape;
            report.events.extend(outcome.records);

            let seen = u64::from(page) * u64::from(PAGE_SIZE);
            if raw < PAGE_SIZE as usize || outcome.total.is_some_and(|t| seen >= t) {
                break;
            }
        }

        report.dedup_events();
        report.elapsed_ms = fetcher.deadline().elapsed().as_millis() as u64;
        info!(
            "betika: {} {} events ({} suspended, {} skipped) from {} pages in {}ms",
            report.events.len(),
            mode,
            report.suspended_count(),
            report.skipped,
            report.pages,
            report.elapsed_ms
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odds_core::stub::{StubResponse, StubServer};
    use serde_json::json;

    #[test]
    fn upcoming_and_live_hosts_differ() {
        let up = page_url(base_url(Mode::Upcoming), Mode::Upcoming, 2).unwrap();
        assert_eq!(up.host_str(), Some("api.betika.com"));
        assert!(up.query().unwrap().contains("page=2"));
        assert!(up.query().unwrap().contains("sport_id=14"));

        let live = page_url(base_url(Mode::Live), Mode::Live, 1).unwrap();
        assert_eq!(live.host_str(), Some("live.betika.com"));
        assert!(!live.query().unwrap().contains("tab="));
    }

    #[test]
    fn flat_shape_maps_and_converts_nairobi_time() {
        let body = json!({
            "meta": { "total": 2, "limit": 50, "current_page": 1 },
            "data": [
                {
                    "parent_match_id": 4521987,
                    "home_team": "Gor Mahia",
                    "away_team": "AFC Leopards",
                    "competition_name": "Premier League",
                    "category": "Kenya",
                    "start_time": "2025-04-27 15:00:00",
                    "home_odd": "1.85",
                    "neutral_odd": "3.40",
                    "away_odd": "4.50",
                    "side_bets": 77
                },
                {
                    "match_id": "4521990",
                    "home_team": "Tusker",
                    "away_team": "Homeboyz",
                    "home_odd": "0.00",
                    "neutral_odd": "0.00",
                    "away_odd": "0.00"
                }
            ]
        });
        let out = map_page(&body, Mode::Upcoming);
        assert_eq!(out.shape, Some("/data"));
        assert_eq!(out.total, Some(2));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.skipped, 1);

        let r = &out.records[0];
        assert_eq!(r.event_id, "4521987");
        assert_eq!(r.event, "Gor Mahia - AFC Leopards");
        assert_eq!(r.tournament, "Premier League");
        assert_eq!(r.start_time.as_deref(), Some("2025-04-27 12:00"));
        assert_eq!(r.odds(), ThreeWay { home: Some(1.85), draw: Some(3.4), away: Some(4.5) });
        assert_eq!(r.market_count, Some(78));
        assert!(!r.suspended);
    }

    #[test]
    fn nested_shape_maps_selections() {
        let body = json!({ "data": { "matches": [{
            "id": "BET123456",
            "home": { "name": "Gor Mahia" },
            "away": { "name": "AFC Leopards" },
            "competition": { "name": "Kenya Premier League", "category": { "name": "Kenya" } },
            "time": 1745762400,
            "markets": [{ "selections": [
                { "name": "1", "odd": "1.85" },
                { "name": "X", "odd": "3.40" },
                { "name": "2", "odd": "4.50" }
            ]}]
        }]}});
        let out = map_page(&body, Mode::Upcoming);
        assert_eq!(out.shape, Some("/data/matches"));
        let r = &out.records[0];
        assert_eq!(r.event_id, "BET123456");
        assert_eq!(r.country, "Kenya");
        assert_eq!(r.tournament, "Kenya Premier League");
        assert_eq!(r.start_time.as_deref(), Some("2025-04-27 14:00"));
        assert!(r.odds().is_complete());
    }

    #[test]
    fn live_flat_match_with_closed_betting_is_suspended() {
        let body = json!({ "data": [{
            "match_id": 99,
            "home_team": "A",
            "away_team": "B",
            "home_odd": "1.5",
            "neutral_odd": "4.0",
            "away_odd": "7.0",
            "bet_status": "STOPPED",
            "match_status": "2nd half",
            "match_time": "63",
            "current_score": "1:1"
        }]});
        let out = map_page(&body, Mode::Live);
        let r = &out.records[0];
        assert!(r.suspended);
        assert_eq!(r.suspension_reason.as_deref(), Some("suspended"));
        let live = r.live.as_ref().unwrap();
        assert_eq!(live.minute, Some(63));
        assert_eq!(live.score.as_deref(), Some("1:1"));
    }

    #[test]
    fn live_flat_match_with_zero_odds_is_kept() {
        let body = json!({ "data": [{
            "match_id": 100, "home_team": "A", "away_team": "B",
            "home_odd": "0", "neutral_odd": "0", "away_odd": "0"
        }]});
        let out = map_page(&body, Mode::Live);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].suspension_reason.as_deref(), Some("all odds zero"));
    }

    #[test]
    fn nested_match_without_markets_reports_zero_markets() {
        let body = json!({ "data": { "matches": [{
            "id": "BET9", "home": { "name": "A" }, "away": { "name": "B" }, "markets": []
        }]}});
        let r = &map_page(&body, Mode::Live).records[0];
        assert_eq!(r.market_count, Some(0));
        assert_eq!(r.suspension_reason.as_deref(), Some("no open markets"));
    }

    #[test]
    fn unknown_shape_is_reported() {
        let out = map_page(&json!({ "status": "ok" }), Mode::Upcoming);
        assert!(out.shape.is_none());
        assert_eq!(out.raw_count, 0);
    }

    #[test]
    fn empty_live_listing_is_a_known_shape() {
        let out = map_page(&json!({ "meta": { "total": 0 }, "data": [] }), Mode::Live);
        assert_eq!(out.shape, Some("/data"));
        assert_eq!(out.total, Some(0));
        assert!(out.records.is_empty());
    }

    // ── Paging against a local stub ──

    fn stub_settings() -> ScrapeSettings {
        ScrapeSettings {
            retries: 1,
            page_delay: std::time::Duration::ZERO,
            ..ScrapeSettings::default()
        }
    }

    fn flat_page(first: u64, count: u64, total: Option<u64>) -> StubResponse {
        let data: Vec<Value> = (first..first + count)
            .map(|id| json!({
                "match_id": id, "home_team": "Gor Mahia", "away_team": "AFC Leopards",
                "home_odd": "1.85", "neutral_odd": "3.40", "away_odd": "4.50"
            }))
            .collect();
        let mut body = json!({ "data": data });
        if let Some(t) = total {
            body["meta"] = json!({ "total": t, "limit": PAGE_SIZE });
        }
        StubResponse::json(&body)
    }

    #[tokio::test]
    async fn meta_total_ends_the_walk() {
        let server = StubServer::start(vec![
            flat_page(1000, 50, Some(100)),
            flat_page(2000, 50, Some(100)),
            flat_page(3000, 50, Some(100)),
        ])
        .await
        .unwrap();
        let scraper = BetikaScraper::new(stub_settings()).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Upcoming).await;
        let hits = server.hits();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].starts_with("/v1/uo/matches?page=1&"));
        assert!(hits[1].starts_with("/v1/uo/matches?page=2&"));
        assert_eq!(report.events.len(), 100);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn listing_ending_on_a_full_page_is_clean() {
        let server = StubServer::start(vec![flat_page(1000, 50, None), flat_page(0, 0, None)])
            .await
            .unwrap();
        let scraper = BetikaScraper::new(stub_settings()).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Upcoming).await;
        assert_eq!(server.hits().len(), 2);
        assert_eq!(report.events.len(), 50);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
    }

    #[tokio::test]
    async fn nothing_in_play_is_not_a_failure() {
        let server = StubServer::start(vec![StubResponse::json(&json!({ "meta": { "total": 0 }, "data": [] }))])
            .await
            .unwrap();
        let scraper = BetikaScraper::new(stub_settings()).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Live).await;
        assert!(report.events.is_empty());
        assert!(report.errors.is_empty());
        assert!(!report.is_failure());
    }
}
