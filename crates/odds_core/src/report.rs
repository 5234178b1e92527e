use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::EventRecord;
use crate::Mode;

/// Outcome of one scrape run for one source.
///
/// `errors` non-empty with `events` empty means the source failed;
/// both empty means the site simply had nothing to offer.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub source:     String,
    pub mode:       &'static str,
    pub events:     Vec<EventRecord>,
    pub pages:      usize,
    pub skipped:    usize,
    pub errors:     Vec<String>,
    pub timed_out:  bool,
    pub elapsed_ms: u64,
    /// JSON pointer matched on the last successful page.
    pub shape:      Option<&'static str>,
}

impl ScrapeReport {
    pub fn new(source: impl Into<String>, mode: Mode) -> Self {
        Self {
            source:     source.into(),
            mode:       mode.as_str(),
            events:     Vec::new(),
            pages:      0,
            skipped:    0,
            errors:     Vec::new(),
            timed_out:  false,
            elapsed_ms: 0,
            shape:      None,
        }
    }

    pub fn failed(source: impl Into<String>, mode: Mode, err: &anyhow::Error) -> Self {
        let mut r = Self::new(source, mode);
        r.errors.push(format!("{err:#}"));
        r
    }

    pub fn is_failure(&self) -> bool {
        self.events.is_empty() && !self.errors.is_empty()
    }

    pub fn suspended_count(&self) -> usize {
        self.events.iter().filter(|e| e.suspended).count()
    }

    pub fn by_country(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &self.events {
            *counts.entry(e.country.as_str()).or_default() += 1;
        }
        let mut out: Vec<(String, usize)> = counts.into_iter().map(|(c, n)| (c.to_string(), n)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Drop later duplicates of the same event id (pages can overlap while
    /// the site reorders its listing).
    pub fn dedup_events(&mut self) -> usize {
        let before = self.events.len();
        let mut seen = std::collections::HashSet::new();
        self.events.retain(|e| seen.insert(e.event_id.clone()));
        before - self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, country: &str) -> EventRecord {
        EventRecord::from_legacy(
            &json!({ "eventId": id, "country": country, "event": "A - B", "home_odds": 2.0 }),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn country_counts_sorted_by_volume() {
        let mut r = ScrapeReport::new("test", Mode::Upcoming);
        r.events = vec![record("1", "Spain"), record("2", "England"), record("3", "England")];
        assert_eq!(
            r.by_country(),
            vec![("England".to_string(), 2), ("Spain".to_string(), 1)]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut r = ScrapeReport::new("test", Mode::Live);
        r.events = vec![record("1", "Ghana"), record("1", "Kenya"), record("2", "Ghana")];
        assert_eq!(r.dedup_events(), 1);
        assert_eq!(r.events[0].country, "Ghana");
        assert_eq!(r.events.len(), 2);
    }

    #[test]
    fn failure_means_errors_and_no_events() {
        let err = anyhow::anyhow!("HTTP 403");
        let r = ScrapeReport::failed("betpawa-gh", Mode::Upcoming, &err);
        assert!(r.is_failure());
        assert!(!ScrapeReport::new("x", Mode::Upcoming).is_failure());
    }
}
