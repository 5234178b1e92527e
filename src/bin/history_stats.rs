use anyhow::{Context, Result};
use oddscrape::history_db::{open, read_stats};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let db_path = std::env::var("HISTORY_DB_PATH").unwrap_or_else(|_| "data/history.db".to_string());
    let conn = open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let stats = read_stats(&conn)?;

    println!("db_path={db_path}");
    for (table, count) in &stats.counts {
        println!("{table}: {count}");
    }
    println!("suspended_now (latest listing per bookmaker): {}", stats.suspended_now);

    if let Some(run) = stats.last_run {
        println!(
            "last_run: ts={} source={} mode={} events={} suspended={} errors={}",
            run.ts,
            run.source,
            run.mode,
            run.events,
            run.suspended,
            run.errors.as_deref().unwrap_or("-")
        );
    } else {
        println!("last_run: <none>");
    }

    Ok(())
}
