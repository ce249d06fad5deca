//! `partload run` command implementation

use crate::output::print_result;
use partload_core::{InvocationAdapter, InvocationEvent, IngestionOrchestrator};
use std::sync::Arc;

/// Ingest one date. Returns whether the run ended without failure.
pub async fn run(orchestrator: Arc<IngestionOrchestrator>, target_date: &str, json: bool) -> anyhow::Result<bool> {
    if json {
        let adapter = InvocationAdapter::new(orchestrator);
        let envelope = adapter.handle(InvocationEvent::for_date(target_date)).await;
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(envelope.is_success());
    }

    let result = orchestrator.run(target_date).await;
    print_result(&result);
    Ok(result.error.is_none())
}
