//! `partload backfill` command implementation

use crate::output::{results_table, spinner};
use colored::Colorize;
use partload_core::{IngestStatus, IngestionOrchestrator};

/// Ingest every date in `dates`; returns whether none failed.
pub async fn run(orchestrator: &IngestionOrchestrator, dates: Vec<String>) -> anyhow::Result<bool> {
    if dates.is_empty() {
        println!("No dates to ingest.");
        return Ok(true);
    }

    let pb = spinner(&format!("Ingesting {} date(s)...", dates.len()));
    let results = orchestrator.run_many(&dates).await;
    pb.finish_and_clear();

    println!("{}", results_table(&results));

    let failed = results
        .iter()
        .filter(|r| r.status == IngestStatus::Failed)
        .count();
    let rows: u64 = results.iter().map(|r| r.rows_inserted).sum();
    println!();
    println!("{}", "Summary:".cyan().bold());
    println!("  Dates:         {}", results.len());
    println!("  Rows inserted: {}", rows);
    if failed > 0 {
        println!("  Failed:        {}", failed.to_string().red());
    }
    Ok(failed == 0)
}

/// Dates waiting under the source prefix, formatted for `run_many`.
pub async fn pending_dates(orchestrator: &IngestionOrchestrator) -> anyhow::Result<Vec<String>> {
    Ok(orchestrator
        .pending_dates()
        .await?
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect())
}
