use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::{first_scalar, first_str, is_truthy};
use crate::odds::{parse_odds, ThreeWay};
use crate::suspension::Suspension;
use crate::teams::{match_key, split_teams};
use crate::time::start_time_string;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score:  Option<String>,
}

/// One football fixture with its 1X2 prices, as emitted by every scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventId")]
    pub event_id:          String,
    #[serde(rename = "originalEventId", default, skip_serializing_if = "Option::is_none")]
    pub original_event_id: Option<String>,
    pub bookmaker:         String,
    pub country:           String,
    pub tournament:        String,
    pub event:             String,
    pub home_team:         String,
    pub away_team:         String,
    pub market:            String,
    pub home_odds:         Option<f64>,
    pub draw_odds:         Option<f64>,
    pub away_odds:         Option<f64>,
    pub start_time:        Option<String>,
    #[serde(default)]
    pub suspended:         bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_count:      Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live:              Option<LiveStatus>,
}

impl EventRecord {
    pub fn odds(&self) -> ThreeWay {
        ThreeWay { home: self.home_odds, draw: self.draw_odds, away: self.away_odds }
    }

    pub fn set_odds(&mut self, odds: ThreeWay) {
        self.home_odds = odds.home;
        self.draw_odds = odds.draw;
        self.away_odds = odds.away;
    }

    pub fn apply_suspension(&mut self, s: &Suspension) {
        self.suspended = s.is_suspended();
        self.suspension_reason = s.reason();
    }

    /// Unique within one bookmaker.
    pub fn key(&self) -> String {
        format!("{}:{}", self.bookmaker, self.event_id)
    }

    pub fn match_key(&self) -> String {
        match_key(&self.home_team, &self.away_team)
    }

    /// Normalize a record written by any of the older scrapers.
    ///
    /// Accepted variants: `home_odds` as string or number, nested
    /// `odds.{home,draw,away}`, team names only inside `event`/`teams`,
    /// `startTime` instead of `start_time`.
    pub fn from_legacy(v: &Value, default_bookmaker: &str) -> Option<Self> {
        let event_id = first_scalar(v, &["/eventId", "/event_id", "/id"])?;

        let event_name = first_str(v, &["/event", "/teams", "/name"]).map(str::to_string);
        let (home_team, away_team) = match (
            first_str(v, &["/home_team", "/homeTeam", "/homeTeamName"]),
            first_str(v, &["/away_team", "/awayTeam", "/awayTeamName"]),
        ) {
            (Some(h), Some(a)) => (h.to_string(), a.to_string()),
            _ => split_teams(event_name.as_deref()?)?,
        };

        let price = |flat: &str, nested: &str| {
            v.pointer(flat)
                .and_then(parse_odds)
                .or_else(|| v.pointer(nested).and_then(parse_odds))
        };

        let start_time = ["/start_time", "/startTime", "/start"]
            .iter()
            .filter_map(|p| v.pointer(p))
            .find_map(|t| match t {
                // already formatted by a previous run
                Value::String(s) if s.len() == 16 && s.as_bytes().get(10) == Some(&b' ') => Some(s.clone()),
                other => start_time_string(other),
            });

        Some(Self {
            event: event_name.unwrap_or_else(|| format!("{home_team} - {away_team}")),
            event_id,
            original_event_id: first_scalar(v, &["/originalEventId"]),
            bookmaker: first_str(v, &["/bookmaker", "/source"]).unwrap_or(default_bookmaker).to_string(),
            country: first_str(v, &["/country"]).unwrap_or("Unknown").to_string(),
            tournament: first_str(v, &["/tournament", "/league"]).unwrap_or("Unknown Tournament").to_string(),
            home_team,
            away_team,
            market: first_str(v, &["/market"]).unwrap_or("1X2").to_string(),
            home_odds: price("/home_odds", "/odds/home"),
            draw_odds: price("/draw_odds", "/odds/draw"),
            away_odds: price("/away_odds", "/odds/away"),
            start_time,
            suspended: is_truthy(v.get("suspended")) || is_truthy(v.get("isSuspended")),
            suspension_reason: first_str(v, &["/suspension_reason"]).map(str::to_string),
            market_count: v.get("market_count").and_then(Value::as_u64),
            live: v.get("live").and_then(|l| serde_json::from_value(l.clone()).ok()),
        })
    }
}
