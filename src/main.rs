/// oddscrape — one-shot odds scrape
///
/// What it does:
///   1. Scrapes the given bookmakers concurrently (upcoming by default, --live for in-play)
///   2. Prints one JSON array of event records to stdout
///   3. Optionally writes the same array to a file
///
/// Logs go to stderr. Exit code 1 when every source failed.
///
/// Usage:
///   cargo run --bin odds-scrape -- betpawa-gh sportybet --pretty
///   cargo run --bin odds-scrape -- sportybet --live --output data/live.json

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use logger::EventLogger;
use odds_core::config::env_or;
use odds_core::output::{print_json_stdout, write_json_file};
use oddscrape::sources::{self, SourceId};
use oddscrape::{Mode, ScrapeSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "odds-scrape", about = "Scrape football 1X2 odds from sportsbooks")]
struct Cli {
    /// Sources to scrape: betpawa-gh, betpawa-ke, sportybet, betika-ke
    #[arg(required = true, num_args = 1..)]
    sources: Vec<SourceId>,

    /// In-play events instead of upcoming fixtures
    #[arg(long)]
    live: bool,

    /// Also write the events to this file (pretty JSON)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pretty-print stdout
    #[arg(long)]
    pretty: bool,

    /// Print a per-source summary to stderr
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    oddscrape::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("odds-scrape failed: {e:#}");
            // stdout consumers always get valid JSON
            let _ = print_json_stdout(&serde_json::json!([]), false);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mode = if cli.live { Mode::Live } else { Mode::Upcoming };
    let settings = ScrapeSettings::from_env();
    let logger = EventLogger::new(env_or("LOG_DIR", "logs".to_string()));

    let mut ids: Vec<SourceId> = Vec::with_capacity(cli.sources.len());
    for s in &cli.sources {
        if !ids.contains(s) {
            ids.push(*s);
        }
    }
    info!(
        "scraping {mode} events from [{}] (timeout {}s, {} retries, max {} pages)",
        ids.iter().map(SourceId::as_str).collect::<Vec<_>>().join(", "),
        settings.request_timeout.as_secs(),
        settings.retries,
        settings.max_pages
    );

    let reports = sources::scrape_many(&ids, mode, &settings).await;
    for r in &reports {
        sources::log_report(&logger, r);
        if cli.summary {
            eprintln!(
                "{:<12} {:>5} events {:>4} suspended {:>4} skipped {:>3} pages {:>6}ms{}",
                r.source,
                r.events.len(),
                r.suspended_count(),
                r.skipped,
                r.pages,
                r.elapsed_ms,
                if r.timed_out { " (timed out)" } else { "" }
            );
            for (country, n) in r.by_country().into_iter().take(10) {
                eprintln!("    {country}: {n}");
            }
        }
    }

    let events = sources::merge_events(&reports);
    print_json_stdout(&events, cli.pretty)?;

    if let Some(path) = &cli.output {
        match write_json_file(path, &events) {
            Ok(()) => info!("wrote {} events to {}", events.len(), path.display()),
            Err(e) => warn!("could not write {}: {e:#}", path.display()),
        }
    }

    let failed = reports.iter().filter(|r| r.is_failure()).count();
    if failed == reports.len() {
        error!("all {failed} source(s) failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
