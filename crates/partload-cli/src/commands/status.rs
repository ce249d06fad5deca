//! `partload status` command implementation

use colored::Colorize;
use partload_core::IngestionOrchestrator;

pub async fn run(orchestrator: &IngestionOrchestrator, target_date: &str) -> anyhow::Result<()> {
    let (key, rows) = orchestrator.partition_status(target_date).await?;

    println!("{}", "Partition:".cyan().bold());
    println!("  Table:  {}", key.table.display_name());
    println!("  Column: {}", key.column);
    println!("  Value:  {}", key.value_string());
    println!("  Rows:   {}", rows);
    Ok(())
}
