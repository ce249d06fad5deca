//! `partload pending` command implementation

use colored::Colorize;
use partload_core::IngestionOrchestrator;

pub async fn run(orchestrator: &IngestionOrchestrator) -> anyhow::Result<()> {
    let dates = orchestrator.pending_dates().await?;
    let resolver = orchestrator.resolver();

    if dates.is_empty() {
        println!("No source objects waiting under s3://{}/{}", resolver.bucket(), resolver.list_prefix());
        return Ok(());
    }

    println!("{}", "Pending dates:".cyan().bold());
    for date in &dates {
        println!("  {}  {}", date.format("%Y-%m-%d").to_string().green(), resolver.source_key(*date));
    }
    println!();
    println!("Run 'partload backfill --pending' to ingest them.");
    Ok(())
}
