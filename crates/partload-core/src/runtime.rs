//! Wiring of production collaborators

use crate::catalog::{Catalog, CatalogRef, DuckDbCatalog};
use crate::config::PipelineConfig;
use crate::pipeline::IngestionOrchestrator;
use crate::storage::{ObjectStore, S3ObjectStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Build an orchestrator backed by S3 and DuckDB from `config`.
pub async fn build_orchestrator(config: &PipelineConfig) -> anyhow::Result<IngestionOrchestrator> {
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.storage).await);

    let duckdb = DuckDbCatalog::open(
        config.catalog.duckdb_target(),
        config.catalog.home_dir.as_deref(),
    )
    .context("Failed to open catalog engine")?;

    if let Some(path) = &config.catalog.init_sql {
        let ddl = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        duckdb
            .bootstrap(&CatalogRef::new(config.target.catalog.clone()), &ddl)
            .context("Failed to run catalog init SQL")?;
        info!(path = %path.display(), "Catalog init SQL applied");
    }

    let catalog: Arc<dyn Catalog> = Arc::new(duckdb);
    IngestionOrchestrator::new(config, store, catalog).context("Invalid pipeline configuration")
}
