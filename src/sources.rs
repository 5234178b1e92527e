//! Source registry: which bookmaker feeds exist and how to run them.

use anyhow::{bail, Result};
use betika_scraper::BetikaScraper;
use betpawa_scraper::{BetpawaScraper, Region};
use futures_util::future::join_all;
use logger::{now_iso, ApiStatusEvent, EventLogger, ScrapeRunEvent};
use odds_core::{EventRecord, Mode, ScrapeReport, ScrapeSettings};
use sportybet_scraper::SportybetScraper;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    BetpawaGh,
    BetpawaKe,
    Sportybet,
    BetikaKe,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::BetpawaGh,
        SourceId::BetpawaKe,
        SourceId::Sportybet,
        SourceId::BetikaKe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::BetpawaGh => "betpawa-gh",
            SourceId::BetpawaKe => "betpawa-ke",
            SourceId::Sportybet => "sportybet",
            SourceId::BetikaKe  => "betika-ke",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(match key.as_str() {
            "betpawa-gh" | "betpawa" | "bp-gh" => SourceId::BetpawaGh,
            "betpawa-ke" | "bp-ke" => SourceId::BetpawaKe,
            "sportybet" | "sporty" => SourceId::Sportybet,
            "betika-ke" | "betika" => SourceId::BetikaKe,
            other => bail!(
                "unknown source '{other}' (expected one of: {})",
                SourceId::ALL.map(|s| s.as_str()).join(", ")
            ),
        })
    }
}

/// Comma separated list, duplicates dropped, order kept.
pub fn parse_source_list(raw: &str) -> Result<Vec<SourceId>> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: SourceId = part.parse()?;
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}

pub async fn scrape(source: SourceId, mode: Mode, settings: &ScrapeSettings) -> ScrapeReport {
    let settings = settings.clone();
    let mut report = match source {
        SourceId::BetpawaGh => BetpawaScraper::new(Region::Ghana, settings).scrape(mode).await,
        SourceId::BetpawaKe => BetpawaScraper::new(Region::Kenya, settings).scrape(mode).await,
        SourceId::Sportybet => SportybetScraper::new(settings).scrape(mode).await,
        SourceId::BetikaKe  => BetikaScraper::new(settings).scrape(mode).await,
    };
    // Report under the registry name even when a scraper uses its own label.
    report.source = source.as_str().to_string();
    if report.is_failure() {
        warn!("{source}: no events, {} error(s): {}", report.errors.len(), report.errors.join("; "));
    }
    report
}

/// All sources concurrently; reports come back in input order.
pub async fn scrape_many(sources: &[SourceId], mode: Mode, settings: &ScrapeSettings) -> Vec<ScrapeReport> {
    join_all(sources.iter().map(|&s| scrape(s, mode, settings))).await
}

pub fn merge_events(reports: &[ScrapeReport]) -> Vec<EventRecord> {
    reports.iter().flat_map(|r| r.events.iter().cloned()).collect()
}

/// One SCRAPE_RUN and one API_STATUS line per report.
pub fn log_report(logger: &EventLogger, report: &ScrapeReport) {
    let run = ScrapeRunEvent {
        ts:         now_iso(),
        event:      "SCRAPE_RUN",
        source:     report.source.clone(),
        mode:       report.mode.to_string(),
        events:     report.events.len(),
        pages:      report.pages,
        skipped:    report.skipped,
        errors:     report.errors.len(),
        timed_out:  report.timed_out,
        elapsed_ms: report.elapsed_ms,
    };
    let status = ApiStatusEvent {
        ts:           now_iso(),
        event:        "API_STATUS",
        source:       report.source.clone(),
        ok:           !report.is_failure(),
        message:      report.errors.first().cloned().unwrap_or_else(|| "ok".to_string()),
        items_logged: report.events.len(),
    };
    for res in [logger.log(&run), logger.log(&status)] {
        if let Err(e) = res {
            warn!("audit log write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("betpawa-gh".parse::<SourceId>().unwrap(), SourceId::BetpawaGh);
        assert_eq!("BetPawa_KE".parse::<SourceId>().unwrap(), SourceId::BetpawaKe);
        assert_eq!("sporty".parse::<SourceId>().unwrap(), SourceId::Sportybet);
        assert_eq!(" betika ".parse::<SourceId>().unwrap(), SourceId::BetikaKe);

        let err = "bet365".parse::<SourceId>().unwrap_err().to_string();
        assert!(err.contains("unknown source 'bet365'"));
        assert!(err.contains("betika-ke"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for id in SourceId::ALL {
            assert_eq!(id.to_string().parse::<SourceId>().unwrap(), id);
        }
    }

    #[test]
    fn source_list_dedups_and_keeps_order() {
        let list = parse_source_list("sportybet, betpawa-gh,,sporty,betika").unwrap();
        assert_eq!(list, vec![SourceId::Sportybet, SourceId::BetpawaGh, SourceId::BetikaKe]);
        assert!(parse_source_list("sportybet,nope").is_err());
        assert!(parse_source_list("").unwrap().is_empty());
    }

    #[test]
    fn merge_concatenates_in_report_order() {
        let rec = |id: &str, book: &str| {
            EventRecord::from_legacy(
                &serde_json::json!({ "eventId": id, "bookmaker": book, "event": "A - B" }),
                book,
            )
            .unwrap()
        };
        let mut a = ScrapeReport::new("sportybet", Mode::Live);
        a.events = vec![rec("1", "sportybet"), rec("2", "sportybet")];
        let mut b = ScrapeReport::new("betika-ke", Mode::Live);
        b.events = vec![rec("9", "betika-ke")];

        let merged = merge_events(&[a, b]);
        let keys: Vec<String> = merged.iter().map(EventRecord::key).collect();
        assert_eq!(keys, vec!["sportybet:1", "sportybet:2", "betika-ke:9"]);
    }
}
