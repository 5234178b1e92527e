/// oddscrape — suspension report over a captured SportyBet response
///
/// Usage:
///   cargo run --bin suspension-report -- dumps/sportybet_live.json --top 10
///   cargo run --bin suspension-report -- dumps/sportybet_live.json --json

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use odds_core::output::print_json_stdout;
use oddscrape::suspension_analysis::{analyze, render};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "suspension-report", about = "Summarise suspended markets in a SportyBet dump")]
struct Cli {
    /// File holding a raw SportyBet factsCenter response
    dump: PathBuf,

    /// How many events to list by suspended market count
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Emit the analysis as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    dotenv().ok();
    oddscrape::init_tracing();
    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.dump)
        .with_context(|| format!("read dump {}", cli.dump.display()))?;
    let dump: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse dump {} as JSON", cli.dump.display()))?;
    info!("loaded {} ({} bytes)", cli.dump.display(), raw.len());

    let analysis = analyze(&dump, cli.top);
    if cli.json {
        print_json_stdout(&analysis, true)?;
    } else {
        print!("{}", render(&analysis));
    }
    Ok(())
}
