//! Offline analysis of a captured SportyBet response: how many events carry
//! suspended markets, how they are distributed, and why 1X2 was pulled.

use odds_core::extract::{as_i64_loose, first_scalar, first_str};
use odds_core::ids::normalize_event_id;
use serde::Serialize;
use serde_json::Value;
use sportybet_scraper::{events_of, MARKET_1X2};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventSuspensions {
    pub event_id:          String,
    pub name:              String,
    pub tournament:        String,
    pub suspended_markets: usize,
    pub total_markets:     usize,
    pub status:            Option<String>,
    pub period:            Option<String>,
    pub played:            Option<String>,
    /// suspendedReason → markets carrying it
    pub reason_counts:     BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suspended1x2 {
    pub event_id: String,
    pub name:     String,
    pub reason:   Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SuspensionAnalysis {
    pub distinct_events:          usize,
    pub events_with_suspended:    usize,
    pub total_suspended_markets:  usize,
    pub avg_suspended_per_event:  f64,
    /// suspended markets per event → number of events, zero included
    pub distribution:             BTreeMap<usize, usize>,
    pub top_events:               Vec<EventSuspensions>,
    pub suspended_1x2:            Vec<Suspended1x2>,
    pub reason_counts:            Vec<(String, usize)>,
}

/// Suspended when the market names a reason or reports a non-zero status.
fn market_suspended(m: &Value) -> bool {
    first_str(m, &["/suspendedReason"]).is_some()
        || m.get("status").and_then(as_i64_loose).is_some_and(|s| s != 0)
}

fn is_1x2(m: &Value) -> bool {
    first_scalar(m, &["/id"]).as_deref() == Some(MARKET_1X2)
        || first_str(m, &["/name", "/desc"]).is_some_and(|n| n.eq_ignore_ascii_case("1X2"))
}

pub fn analyze(dump: &Value, top_n: usize) -> SuspensionAnalysis {
    let (pairs, _) = events_of(dump);

    // the same event can appear under several tournaments in a dump
    let mut per_event: HashMap<String, EventSuspensions> = HashMap::new();
    let mut suspended_1x2: BTreeMap<String, Suspended1x2> = BTreeMap::new();

    for (tournament, event) in pairs {
        let Some(raw_id) = first_scalar(event, &["/eventId"]) else { continue };
        let event_id = normalize_event_id(&raw_id);
        let name = match (
            first_str(event, &["/homeTeamName"]),
            first_str(event, &["/awayTeamName"]),
        ) {
            (Some(h), Some(a)) => format!("{h} vs {a}"),
            _ => raw_id.clone(),
        };
        let markets = event.get("markets").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        let suspended = markets.iter().filter(|m| market_suspended(m)).count();
        let mut reason_counts = BTreeMap::new();
        for r in markets.iter().filter_map(|m| first_str(m, &["/suspendedReason"])) {
            *reason_counts.entry(r.to_string()).or_insert(0) += 1;
        }

        if let Some(m) = markets.iter().find(|m| is_1x2(m) && market_suspended(m)) {
            suspended_1x2.entry(event_id.clone()).or_insert_with(|| Suspended1x2 {
                event_id: event_id.clone(),
                name: name.clone(),
                reason: first_str(m, &["/suspendedReason"]).map(str::to_string),
            });
        }

        let entry = per_event.entry(event_id.clone()).or_insert_with(|| EventSuspensions {
            event_id,
            name,
            tournament: tournament
                .and_then(|t| first_str(t, &["/name"]))
                .unwrap_or("Unknown Tournament")
                .to_string(),
            suspended_markets: 0,
            total_markets: 0,
            status: first_str(event, &["/matchStatus"]).map(str::to_string),
            period: first_scalar(event, &["/period"]),
            played: first_str(event, &["/playedSeconds"]).map(str::to_string),
            reason_counts: BTreeMap::new(),
        });
        if suspended > entry.suspended_markets || entry.reason_counts.is_empty() {
            entry.reason_counts = reason_counts;
        }
        entry.suspended_markets = entry.suspended_markets.max(suspended);
        entry.total_markets = entry.total_markets.max(markets.len());
    }

    let mut events: Vec<EventSuspensions> = per_event.into_values().collect();
    events.sort_by(|a, b| b.suspended_markets.cmp(&a.suspended_markets).then_with(|| a.event_id.cmp(&b.event_id)));

    let with_suspended = events.iter().filter(|e| e.suspended_markets > 0).count();
    let total_suspended: usize = events.iter().map(|e| e.suspended_markets).sum();

    let mut distribution = BTreeMap::new();
    for e in &events {
        *distribution.entry(e.suspended_markets).or_insert(0) += 1;
    }

    let mut reasons: HashMap<String, usize> = HashMap::new();
    for s in suspended_1x2.values() {
        let r = s.reason.clone().unwrap_or_else(|| "unspecified".to_string());
        *reasons.entry(r).or_default() += 1;
    }
    let mut reason_counts: Vec<(String, usize)> = reasons.into_iter().collect();
    reason_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    SuspensionAnalysis {
        distinct_events: events.len(),
        events_with_suspended: with_suspended,
        total_suspended_markets: total_suspended,
        avg_suspended_per_event: if events.is_empty() {
            0.0
        } else {
            total_suspended as f64 / events.len() as f64
        },
        distribution,
        top_events: events.into_iter().take(top_n).collect(),
        suspended_1x2: suspended_1x2.into_values().collect(),
        reason_counts,
    }
}

/// Plain-text report for the terminal.
pub fn render(a: &SuspensionAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total distinct events: {}", a.distinct_events);
    let _ = writeln!(out, "Events with at least one suspended market: {}", a.events_with_suspended);
    let _ = writeln!(out, "Events with no suspended markets: {}", a.distinct_events - a.events_with_suspended);
    let _ = writeln!(out, "Total suspended markets: {}", a.total_suspended_markets);
    let _ = writeln!(out, "Average suspended markets per event: {:.2}", a.avg_suspended_per_event);

    let _ = writeln!(out, "\nDistribution (suspended markets -> events):");
    for (markets, events) in &a.distribution {
        let _ = writeln!(out, "  {markets}: {events}");
    }

    let _ = writeln!(out, "\nTop events by suspended markets:");
    for e in &a.top_events {
        let _ = writeln!(
            out,
            "  sr:match:{} {} [{}] {}/{} suspended (status: {}, period: {}, played: {})",
            e.event_id,
            e.name,
            e.tournament,
            e.suspended_markets,
            e.total_markets,
            e.status.as_deref().unwrap_or("-"),
            e.period.as_deref().unwrap_or("-"),
            e.played.as_deref().unwrap_or("-"),
        );
        for (reason, count) in &e.reason_counts {
            let _ = writeln!(out, "    {reason}: {count} markets");
        }
    }

    let _ = writeln!(out, "\nTotal events with suspended 1X2 markets: {}", a.suspended_1x2.len());
    for s in &a.suspended_1x2 {
        match &s.reason {
            Some(r) => {
                let _ = writeln!(out, "  Event sr:match:{} - {} (Reason: {r})", s.event_id, s.name);
            }
            None => {
                let _ = writeln!(out, "  Event sr:match:{} - {}", s.event_id, s.name);
            }
        }
    }
    if !a.reason_counts.is_empty() {
        let _ = writeln!(out, "\nSuspension reasons for 1X2 markets:");
        for (reason, count) in &a.reason_counts {
            let _ = writeln!(out, "  {reason}: {count} events");
        }
    }
    out
}
