/// oddscrape — BetPawa scraper
///
/// Sportsbook v2 API, one host per country:
///   GET https://www.betpawa.com.gh/api/sportsbook/v2/events/lists/by-queries?q=<json>
///
/// `q` carries event type (UPCOMING | LIVE), category 2 (football), market
/// type 3743 (1X2) and skip/take pagination. Responses have come back as
/// `responses[0].responses`, `queries[0].events` or a bare `events` array.

use anyhow::{anyhow, Context, Result};
use odds_core::extract::{first_scalar, first_str, is_truthy, sniff_array};
use odds_core::fetch::build_client;
use odds_core::time::start_time_string;
use odds_core::{
    EventRecord, HttpFetcher, LiveStatus, Mode, ScrapeReport, ScrapeSettings, SuspensionSignals, ThreeWay,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const MARKET_1X2: &str = "3743";
pub const FOOTBALL_CATEGORY: u32 = 2;
pub const PAGE_SIZE: u32 = 20;

const EVENT_PATHS: &[&str] = &[
    "/responses/0/responses",
    "/queries/0/events",
    "/data/events",
    "/events",
    "",
];

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Ghana,
    Kenya,
}

impl Region {
    pub fn host(&self) -> &'static str {
        match self {
            Region::Ghana => "www.betpawa.com.gh",
            Region::Kenya => "www.betpawa.co.ke",
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.host())
    }

    pub fn brand(&self) -> &'static str {
        match self {
            Region::Ghana => "betpawa-ghana",
            Region::Kenya => "betpawa-kenya",
        }
    }

    /// Name used in records and logs.
    pub fn source_name(&self) -> &'static str {
        match self {
            Region::Ghana => "betpawa-gh",
            Region::Kenya => "betpawa-ke",
        }
    }
}

impl FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gh" | "ghana" => Ok(Region::Ghana),
            "ke" | "kenya" => Ok(Region::Kenya),
            other => Err(anyhow!("unknown BetPawa region '{other}' (expected gh or ke)")),
        }
    }
}

fn event_type(mode: Mode) -> &'static str {
    match mode {
        Mode::Upcoming => "UPCOMING",
        Mode::Live => "LIVE",
    }
}

// ── Request builder ──────────────────────────────────────────────────────────

pub fn build_query(mode: Mode, skip: u32, take: u32) -> Value {
    json!({
        "queries": [{
            "query": {
                "eventType": event_type(mode),
                "categories": [FOOTBALL_CATEGORY],
                "zones": {},
                "hasOdds": true
            },
            "view": { "marketTypes": [MARKET_1X2] },
            "skip": skip,
            "take": take
        }]
    })
}

pub fn page_url(base_url: &str, mode: Mode, skip: u32) -> Result<Url> {
    let base = format!("{base_url}/api/sportsbook/v2/events/lists/by-queries");
    let q = build_query(mode, skip, PAGE_SIZE).to_string();
    Url::parse_with_params(&base, &[("q", q)]).context("BetPawa URL")
}

pub fn browser_headers(region: Region, cookie: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let fixed: [(&'static str, &'static str); 13] = [
        ("accept", "*/*"),
        ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8"),
        ("devicetype", "web"),
        ("priority", "u=1, i"),
        ("sec-ch-ua", "\"Google Chrome\";v=\"135\", \"Not-A.Brand\";v=\"8\", \"Chromium\";v=\"135\""),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"macOS\""),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("user-agent", USER_AGENT),
        ("vuejs", "true"),
        ("x-pawa-language", "en"),
    ];
    for (name, value) in fixed {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.insert(HeaderName::from_static("x-pawa-brand"), HeaderValue::from_static(region.brand()));

    let referer = format!("https://{}/events?marketId=1X2&categoryId={}", region.host(), FOOTBALL_CATEGORY);
    if let Ok(v) = HeaderValue::from_str(&referer) {
        headers.insert(reqwest::header::REFERER, v);
    }

    if let Some(cookie) = cookie {
        match HeaderValue::from_str(cookie) {
            Ok(v) => {
                headers.insert(reqwest::header::COOKIE, v);
            }
            Err(_) => warn!("BETPAWA_COOKIE contains invalid header characters, sending without cookies"),
        }
    }
    headers
}

// ── Field mapper ─────────────────────────────────────────────────────────────

fn find_1x2_market(event: &Value) -> Option<&Value> {
    event.get("markets")?.as_array()?.iter().find(|m| {
        first_scalar(m, &["/marketType/id", "/typeId"]).as_deref() == Some(MARKET_1X2)
    })
}

fn sportradar_id(event: &Value) -> Option<String> {
    event
        .get("widgets")?
        .as_array()?
        .iter()
        .find(|w| w.get("type").and_then(Value::as_str) == Some("SPORTRADAR"))
        .and_then(|w| first_scalar(w, &["/id"]))
}

fn teams(event: &Value, name: &str) -> Option<(String, String)> {
    if let Some(parts) = event.get("participants").and_then(Value::as_array) {
        let by_pos = |pos: i64| {
            parts
                .iter()
                .find(|p| p.get("position").and_then(Value::as_i64) == Some(pos))
                .and_then(|p| first_str(p, &["/name"]))
        };
        if let (Some(h), Some(a)) = (by_pos(1), by_pos(2)) {
            return Some((h.to_string(), a.to_string()));
        }
    }
    odds_core::teams::split_teams(name)
}

fn live_status(event: &Value) -> LiveStatus {
    LiveStatus {
        status: first_str(event, &["/scoreboard/status", "/status"]).map(str::to_string),
        period: first_str(event, &["/scoreboard/display/period", "/scoreboard/period"]).map(str::to_string),
        minute: first_scalar(event, &["/scoreboard/display/minute", "/scoreboard/minute"])
            .and_then(|m| m.trim_end_matches('\'').parse().ok()),
        score:  first_str(event, &["/scoreboard/display/score", "/scoreboard/score"]).map(str::to_string),
    }
}

/// One raw BetPawa event → record. Upcoming events without a 1X2 market
/// are an error (skipped); live ones are kept and flagged suspended.
pub fn map_event(event: &Value, region: Region, mode: Mode) -> Result<EventRecord> {
    let site_id = first_scalar(event, &["/id"]).context("event without id")?;
    let name = first_str(event, &["/name"]).context("event without name")?;
    let (home_team, away_team) = teams(event, name).with_context(|| format!("cannot split teams from '{name}'"))?;

    let market = find_1x2_market(event);
    if market.is_none() && mode == Mode::Upcoming {
        return Err(anyhow!("no 1X2 market on event {site_id}"));
    }

    let prices: Vec<&Value> = market
        .and_then(|m| m.get("prices"))
        .and_then(Value::as_array)
        .map(|p| p.iter().collect())
        .unwrap_or_default();

    let odds = ThreeWay::from_outcomes(
        prices
            .iter()
            .filter_map(|p| Some((p.get("name")?.as_str()?, p.get("price")?))),
    );

    let flagged = market.is_some_and(|m| is_truthy(m.get("suspended")))
        || (!prices.is_empty() && prices.iter().all(|p| is_truthy(p.get("suspended"))));

    let market_count = event.get("totalMarketCount").and_then(Value::as_u64);
    let signals = SuspensionSignals {
        flagged,
        reason: market.and_then(|m| first_str(m, &["/suspendedReason"])).map(str::to_string),
        market_count,
        odds,
    };

    let (event_id, original_event_id) = match sportradar_id(event) {
        Some(sr) if sr != site_id => (sr, Some(site_id)),
        Some(sr) => (sr, None),
        None => (site_id, None),
    };

    let mut record = EventRecord {
        event_id,
        original_event_id,
        bookmaker: region.source_name().to_string(),
        country: first_str(event, &["/region/name", "/category/name"]).unwrap_or("Unknown").to_string(),
        tournament: first_str(event, &["/competition/name"]).unwrap_or("Unknown Tournament").to_string(),
        event: name.to_string(),
        home_team,
        away_team,
        market: market
            .and_then(|m| first_str(m, &["/marketType/name"]))
            .unwrap_or("1X2")
            .to_string(),
        home_odds: None,
        draw_odds: None,
        away_odds: None,
        start_time: event.get("startTime").and_then(start_time_string),
        suspended: false,
        suspension_reason: None,
        market_count,
        live: (mode == Mode::Live).then(|| live_status(event)),
    };
    record.set_odds(odds);
    record.apply_suspension(&signals.assess());
    Ok(record)
}

#[derive(Debug, Default)]
pub struct PageOutcome {
    pub records:   Vec<EventRecord>,
    pub raw_count: usize,
    pub skipped:   usize,
    pub shape:     Option<&'static str>,
}

pub fn map_page(body: &Value, region: Region, mode: Mode) -> PageOutcome {
    let Some(sniffed) = sniff_array(body, EVENT_PATHS) else {
        return PageOutcome::default();
    };

    let mut out = PageOutcome {
        raw_count: sniffed.items.len(),
        shape: Some(sniffed.path),
        ..Default::default()
    };
    for raw in sniffed.items {
        match map_event(raw, region, mode) {
            Ok(r) => out.records.push(r),
            Err(e) => {
                debug!("{} skipping event: {:#}", region.source_name(), e);
                out.skipped += 1;
            }
        }
    }
    out
}

// ── Scraper ──────────────────────────────────────────────────────────────────

pub struct BetpawaScraper {
    region:   Region,
    client:   reqwest::Client,
    settings: ScrapeSettings,
    base_url: String,
}

impl BetpawaScraper {
    pub fn new(region: Region, settings: ScrapeSettings) -> Self {
        Self {
            region,
            client: build_client(),
            settings,
            base_url: region.base_url(),
        }
    }

    /// Point the scraper at another host (mirror, local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Walk skip/take pages until an empty page, `max_pages` or the deadline.
    pub async fn scrape(&self, mode: Mode) -> ScrapeReport {
        let source = self.region.source_name();
        let fetcher = HttpFetcher::with_client(self.client.clone(), &self.settings);
        let headers = browser_headers(self.region, self.settings.betpawa_cookie.as_deref());
        let mut report = ScrapeReport::new(source, mode);

        let mut skip = 0u32;
        for page in 0..self.settings.max_pages {
            if fetcher.deadline().expired() {
                warn!("{source}: runtime limit reached after {page} pages, returning partial results");
                report.timed_out = true;
                break;
            }

            let url = match page_url(&self.base_url, mode, skip) {
                Ok(u) => u,
                Err(e) => {
                    report.errors.push(format!("{e:#}"));
                    break;
                }
            };

            info!("{source}: fetching {mode} page with skip={skip}");
            let body = match fetcher.get_json(&url, &headers).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("{source}: page skip={skip} failed: {e:#}");
                    report.timed_out |= fetcher.deadline().expired();
                    report.errors.push(format!("skip={skip}: {e:#}"));
                    break;
                }
            };
            report.pages += 1;

            let outcome = map_page(&body, self.region, mode);
            if outcome.shape.is_none() {
                warn!("{source}: unrecognised response shape at skip={skip}");
                report.errors.push(format!("skip={skip}: unrecognised response shape"));
                break;
            }
            if outcome.raw_count == 0 {
                info!("{source}: no more events at skip={skip}, stopping");
                break;
            }
            report.skipped += outcome.skipped;
            report.shape = outcome.shape;
            report.events.extend(outcome.records);

            if outcome.raw_count < PAGE_SIZE as usize {
                break;
            }
            skip += PAGE_SIZE;
        }

        let dupes = report.dedup_events();
        if dupes > 0 {
            debug!("{source}: dropped {dupes} duplicate events across pages");
        }
        report.elapsed_ms = fetcher.deadline().elapsed().as_millis() as u64;
        info!(
            "{source}: {} events ({} suspended, {} skipped) from {} pages in {}ms",
            report.events.len(),
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

    fn raw_event(id: u64, name: &str, prices: Value) -> Value {
        json!({
            "id": id.to_string(),
            "name": name,
            "startTime": "2025-04-27T15:00:00Z",
            "region": { "name": "Ghana" },
            "competition": { "name": "Premier League" },
            "totalMarketCount": 87,
            "widgets": [
                { "type": "BETRADAR_STATS", "id": "x" },
                { "type": "SPORTRADAR", "id": format!("5127{id}") }
            ],
            "markets": [
                { "marketType": { "id": "3", "name": "Double Chance" }, "prices": [] },
                { "marketType": { "id": "3743", "name": "1X2 - FT" }, "prices": prices }
            ]
        })
    }

    fn full_prices() -> Value {
        json!([
            { "name": "1", "price": 2.45 },
            { "name": "X", "price": 2.9 },
            { "name": "2", "price": 3.1 }
        ])
    }

    #[test]
    fn query_carries_pagination_and_market() {
        let q = build_query(Mode::Live, 40, 20);
        assert_eq!(q["queries"][0]["query"]["eventType"], "LIVE");
        assert_eq!(q["queries"][0]["view"]["marketTypes"][0], "3743");
        assert_eq!(q["queries"][0]["skip"], 40);
        assert_eq!(q["queries"][0]["take"], 20);
    }

    #[test]
    fn url_encodes_query_for_each_region() {
        let url = page_url(&Region::Kenya.base_url(), Mode::Upcoming, 20).unwrap();
        assert_eq!(url.host_str(), Some("www.betpawa.co.ke"));
        assert!(!url.as_str().contains('{'));

        let (_, q) = url.query_pairs().find(|(k, _)| k == "q").unwrap();
        let decoded: Value = serde_json::from_str(&q).unwrap();
        assert_eq!(decoded, build_query(Mode::Upcoming, 20, PAGE_SIZE));
    }

    #[test]
    fn headers_carry_brand_and_optional_cookie() {
        let h = browser_headers(Region::Ghana, Some("x-pawa-token=abc; PHPSESSID=def"));
        assert_eq!(h["x-pawa-brand"], "betpawa-ghana");
        assert_eq!(h[reqwest::header::COOKIE], "x-pawa-token=abc; PHPSESSID=def");
        assert!(h[reqwest::header::REFERER].to_str().unwrap().starts_with("https://www.betpawa.com.gh/"));

        let h = browser_headers(Region::Kenya, None);
        assert!(h.get(reqwest::header::COOKIE).is_none());
    }

    #[test]
    fn region_parsing() {
        assert_eq!("GH".parse::<Region>().unwrap(), Region::Ghana);
        assert_eq!("kenya".parse::<Region>().unwrap(), Region::Kenya);
        assert!("ng".parse::<Region>().is_err());
    }

    #[test]
    fn maps_upcoming_event() {
        let ev = raw_event(1, "Hearts of Oak - Asante Kotoko", full_prices());
        let r = map_event(&ev, Region::Ghana, Mode::Upcoming).unwrap();

        assert_eq!(r.event_id, "51271");
        assert_eq!(r.original_event_id.as_deref(), Some("1"));
        assert_eq!(r.bookmaker, "betpawa-gh");
        assert_eq!(r.country, "Ghana");
        assert_eq!(r.tournament, "Premier League");
        assert_eq!(r.market, "1X2 - FT");
        assert_eq!((r.home_team.as_str(), r.away_team.as_str()), ("Hearts of Oak", "Asante Kotoko"));
        assert_eq!((r.home_odds, r.draw_odds, r.away_odds), (Some(2.45), Some(2.9), Some(3.1)));
        assert_eq!(r.start_time.as_deref(), Some("2025-04-27 15:00"));
        assert!(!r.suspended);
        assert!(r.live.is_none());
    }

    #[test]
    fn suspended_prices_flag_the_event() {
        let prices = json!([
            { "name": "1", "price": 2.45, "suspended": true },
            { "name": "X", "price": 2.9, "suspended": true },
            { "name": "2", "price": 3.1, "suspended": true }
        ]);
        let r = map_event(&raw_event(2, "A - B", prices), Region::Ghana, Mode::Live).unwrap();
        assert!(r.suspended);
        assert_eq!(r.suspension_reason.as_deref(), Some("suspended"));
        assert!(r.live.is_some());
    }

    #[test]
    fn zero_odds_are_suspended() {
        let prices = json!([
            { "name": "1", "price": 0 },
            { "name": "X", "price": 0 },
            { "name": "2", "price": 0 }
        ]);
        let r = map_event(&raw_event(3, "A - B", prices), Region::Kenya, Mode::Live).unwrap();
        assert!(r.suspended);
        assert_eq!(r.suspension_reason.as_deref(), Some("all odds zero"));
        assert_eq!(r.home_odds, None);
    }

    #[test]
    fn missing_market_skips_upcoming_but_keeps_live() {
        let mut ev = raw_event(4, "A - B", full_prices());
        ev["markets"] = json!([]);
        ev["totalMarketCount"] = json!(0);

        assert!(map_event(&ev, Region::Ghana, Mode::Upcoming).is_err());

        let r = map_event(&ev, Region::Ghana, Mode::Live).unwrap();
        assert!(r.suspended);
        assert_eq!(r.suspension_reason.as_deref(), Some("no open markets"));
        assert_eq!(r.market, "1X2");
    }

    #[test]
    fn page_mapping_sniffs_shape_and_counts_skips() {
        let body = json!({
            "responses": [{
                "responses": [
                    raw_event(5, "Medeama - Aduana", full_prices()),
                    raw_event(6, "Outright winner", full_prices()),
                ]
            }]
        });
        let out = map_page(&body, Region::Ghana, Mode::Upcoming);
        assert_eq!(out.shape, Some("/responses/0/responses"));
        assert_eq!(out.raw_count, 2);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn participants_win_over_name_splitting() {
        let mut ev = raw_event(7, "Weird Name Format", full_prices());
        ev["participants"] = json!([
            { "name": "Away FC", "position": 2 },
            { "name": "Home FC", "position": 1 }
        ]);
        let r = map_event(&ev, Region::Ghana, Mode::Upcoming).unwrap();
        assert_eq!(r.home_team, "Home FC");
        assert_eq!(r.away_team, "Away FC");
    }

    #[test]
    fn empty_body_is_end_of_listing() {
        let out = map_page(&json!({ "responses": [{ "responses": [] }] }), Region::Ghana, Mode::Upcoming);
        assert_eq!(out.raw_count, 0);
        assert_eq!(out.shape, Some("/responses/0/responses"));

        let out = map_page(&json!({ "message": "maintenance" }), Region::Ghana, Mode::Upcoming);
        assert!(out.shape.is_none());
    }

    // ── Paging against a local stub ──

    fn stub_settings(max_pages: u32) -> ScrapeSettings {
        ScrapeSettings {
            retries: 1,
            max_pages,
            page_delay: std::time::Duration::ZERO,
            ..ScrapeSettings::default()
        }
    }

    /// `count` events with ids `first..first + count`.
    fn listing(first: u64, count: u64) -> StubResponse {
        let events: Vec<Value> = (first..first + count)
            .map(|id| raw_event(id, "Hearts of Oak - Asante Kotoko", full_prices()))
            .collect();
        StubResponse::json(&json!({ "responses": [{ "responses": events }] }))
    }

    fn skip_of(server: &StubServer, hit: &str) -> u64 {
        let url = Url::parse(&format!("{}{}", server.base_url(), hit)).unwrap();
        let (_, q) = url.query_pairs().find(|(k, _)| k == "q").unwrap();
        let q: Value = serde_json::from_str(&q).unwrap();
        q["queries"][0]["skip"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn short_page_ends_the_walk() {
        let server = StubServer::start(vec![listing(100, 20), listing(200, 5), listing(300, 20)])
            .await
            .unwrap();
        let scraper = BetpawaScraper::new(Region::Ghana, stub_settings(10)).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Upcoming).await;
        assert_eq!(report.events.len(), 25);
        assert_eq!(report.pages, 2);
        assert!(report.errors.is_empty());

        let hits = server.hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(skip_of(&server, &hits[0]), 0);
        assert_eq!(skip_of(&server, &hits[1]), 20);
    }

    #[tokio::test]
    async fn empty_page_ends_the_walk() {
        let server = StubServer::start(vec![listing(100, 20), listing(200, 20), listing(300, 0)])
            .await
            .unwrap();
        let scraper = BetpawaScraper::new(Region::Kenya, stub_settings(10)).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Upcoming).await;
        assert_eq!(server.hits().len(), 3);
        assert_eq!(report.events.len(), 40);
        assert!(report.errors.is_empty());
        assert!(report.events.iter().all(|e| e.bookmaker == "betpawa-ke"));
    }

    #[tokio::test]
    async fn max_pages_caps_the_walk() {
        let server = StubServer::start(vec![listing(100, 20), listing(200, 20), listing(300, 20)])
            .await
            .unwrap();
        let scraper = BetpawaScraper::new(Region::Ghana, stub_settings(2)).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Upcoming).await;
        assert_eq!(server.hits().len(), 2);
        assert_eq!(report.events.len(), 40);
    }

    #[tokio::test]
    async fn unknown_shape_fails_the_source() {
        let server = StubServer::start(vec![StubResponse::json(&json!({ "message": "maintenance" }))])
            .await
            .unwrap();
        let scraper = BetpawaScraper::new(Region::Ghana, stub_settings(10)).with_base_url(server.base_url());

        let report = scraper.scrape(Mode::Live).await;
        assert!(report.is_failure());
        assert!(report.errors[0].contains("unrecognised response shape"));
    }
}
