//! odds_core — shared building blocks for the sportsbook scrapers
//!
//! Every bookmaker scraper runs the same four stages:
//!   1. build request (URL + browser-like headers)
//!   2. fetch page(s) through `HttpFetcher` (timeouts, retries, pacing, deadline)
//!   3. sniff the response shape (`extract::sniff_array`)
//!   4. map raw events into `EventRecord`
//!
//! Only stage 1 and the per-site field paths differ between bookmakers.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod ids;
pub mod odds;
pub mod output;
pub mod record;
pub mod report;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;
pub mod suspension;
pub mod teams;
pub mod time;

pub use config::ScrapeSettings;
pub use fetch::{Deadline, HttpFetcher, RetryPolicy};
pub use odds::{OutcomeLabel, ThreeWay};
pub use record::{EventRecord, LiveStatus};
pub use report::ScrapeReport;
pub use suspension::{Suspension, SuspensionSignals, SuspensionTracker, Transition};

/// Scrape upcoming fixtures or in-play events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Upcoming,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Upcoming => "upcoming",
            Mode::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
