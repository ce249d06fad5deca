//! Terminal rendering of ingestion results

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use partload_core::{IngestStatus, IngestionResult};
use std::time::Duration;

pub fn status_label(status: IngestStatus) -> String {
    match status {
        IngestStatus::Success => "success".green().to_string(),
        IngestStatus::NoData => "no data".yellow().to_string(),
        IngestStatus::Failed => "failed".red().bold().to_string(),
    }
}

/// One row per result: date, status, rows, and archive key or error.
pub fn results_table(results: &[IngestionResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Date", "Status", "Rows", "Detail"]);

    for result in results {
        let detail = match (&result.error, &result.archive) {
            (Some(err), _) => format!("{}: {}", err.kind, err.message),
            (None, Some(archive)) if archive.source_retained => {
                format!("{} (source retained)", archive.archive_key)
            }
            (None, Some(archive)) => archive.archive_key.clone(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(&result.target_date),
            Cell::new(status_label(result.status)),
            Cell::new(result.rows_inserted),
            Cell::new(detail),
        ]);
    }
    table
}

pub fn print_result(result: &IngestionResult) {
    println!(
        "{} {} ({})",
        result.target_date.bold(),
        status_label(result.status),
        result.invocation_id
    );
    println!("  Rows inserted: {}", result.rows_inserted);
    if let Some(archive) = &result.archive {
        println!("  Archived to:   s3://{}/{}", archive.bucket, archive.archive_key);
        if archive.source_retained {
            println!(
                "  {}",
                "Source could not be deleted and was left in place".yellow()
            );
        }
    }
    if let Some(err) = &result.error {
        println!("  Stage:         {}", err.stage);
        println!("  Error:         {}", err.message.red());
        if result.committed {
            println!("  {} rows are already committed to the partition.", result.rows_inserted);
        }
        if err.retryable {
            println!("  Re-running the same date is safe.");
        }
    }
}

/// Spinner for indeterminate work
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
