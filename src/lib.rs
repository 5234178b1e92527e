//! oddscrape — football 1X2 odds from African sportsbooks
//!
//! Per-bookmaker scrapers live in their own crates (`betpawa_scraper`,
//! `sportybet_scraper`, `betika_scraper`) on top of `odds_core`. This crate
//! ties them together for the binaries:
//!   - `sources`: source registry + concurrent dispatch
//!   - `poller`: live polling loop with start/stop/status
//!   - `history_db`: SQLite history written off the async runtime
//!   - `suspension_analysis`: offline report over a captured SportyBet dump

pub mod history_db;
pub mod poller;
pub mod sources;
pub mod suspension_analysis;

pub use odds_core::{EventRecord, Mode, ScrapeReport, ScrapeSettings};
pub use sources::SourceId;

use tracing_subscriber::{fmt, EnvFilter};

/// Shared subscriber setup; logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
