//! Ingestion orchestrator
//!
//! One invocation moves one dated batch through
//! `Start -> Resolved -> Read -> {NoData | Written -> Archived} | Failed`.
//! Stages run strictly in order and the first failure ends the run; there are
//! no retries inside an invocation. Re-running the whole invocation is always
//! safe: the partition replace is idempotent and archiving deletes the source
//! only after a verified copy.

use crate::archive::{ArchiveLayout, ArchiveRecord, Archiver};
use crate::catalog::{Catalog, CatalogRef, CatalogWriter};
use crate::config::PipelineConfig;
use crate::error::{ErrorDetail, ErrorKind, IngestError, Result};
use crate::partition::{PartitionKey, SourcePathResolver};
use crate::source::SourceReader;
use crate::storage::{bounded, ObjectStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    NoData,
    Failed,
}

/// Orchestrator states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Resolved,
    Read,
    Written,
    Archived,
    NoData,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Start => "start",
            PipelineState::Resolved => "resolved",
            PipelineState::Read => "read",
            PipelineState::Written => "written",
            PipelineState::Archived => "archived",
            PipelineState::NoData => "no_data",
            PipelineState::Failed => "failed",
        })
    }
}

/// Terminal outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub invocation_id: Uuid,
    pub status: IngestStatus,
    pub target_date: String,
    pub rows_inserted: u64,
    /// Rows for the partition are committed to the catalog. Also set on a
    /// failed run whose archive step failed after the write.
    pub committed: bool,
    pub partition_key: Option<PartitionKey>,
    pub archive: Option<ArchiveRecord>,
    pub error: Option<ErrorDetail>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl IngestionResult {
    fn success(
        run: &Invocation,
        key: PartitionKey,
        rows_inserted: u64,
        archive: ArchiveRecord,
    ) -> Self {
        Self {
            partition_key: Some(key),
            rows_inserted,
            committed: true,
            archive: Some(archive),
            ..Self::base(run, IngestStatus::Success)
        }
    }

    fn no_data(run: &Invocation, key: PartitionKey) -> Self {
        Self {
            partition_key: Some(key),
            ..Self::base(run, IngestStatus::NoData)
        }
    }

    fn failed(run: &Invocation, progress: Progress, err: &IngestError) -> Self {
        Self {
            partition_key: progress.key,
            rows_inserted: progress.rows_written.unwrap_or(0),
            committed: progress.rows_written.is_some(),
            error: Some(ErrorDetail::from(err)),
            ..Self::base(run, IngestStatus::Failed)
        }
    }

    fn base(run: &Invocation, status: IngestStatus) -> Self {
        Self {
            invocation_id: run.id,
            status,
            target_date: run.target_date.clone(),
            rows_inserted: 0,
            committed: false,
            partition_key: None,
            archive: None,
            error: None,
            started_at: run.started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == IngestStatus::Success
    }
}

/// What a run had achieved when it stopped.
#[derive(Default)]
struct Progress {
    key: Option<PartitionKey>,
    rows_written: Option<u64>,
}

struct Invocation {
    id: Uuid,
    target_date: String,
    started_at: DateTime<Utc>,
    state: PipelineState,
}

impl Invocation {
    fn advance(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
    }
}

pub struct IngestionOrchestrator {
    resolver: SourcePathResolver,
    reader: SourceReader,
    writer: CatalogWriter,
    archiver: Archiver,
    store: Arc<dyn ObjectStore>,
    call_timeout: std::time::Duration,
}

impl IngestionOrchestrator {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self> {
        let resolver = SourcePathResolver::new(
            config.source.bucket.clone(),
            &config.source.prefix,
            config.source.file_prefix.clone(),
            &config.source.extension,
            config.target.table_id()?,
            config.expected_schema(),
        )?;
        let call_timeout = config.call_timeout;

        Ok(Self {
            resolver,
            reader: SourceReader::new(Arc::clone(&store), call_timeout),
            writer: CatalogWriter::new(
                catalog,
                CatalogRef::new(config.target.catalog.clone()),
                call_timeout,
            ),
            archiver: Archiver::new(
                Arc::clone(&store),
                ArchiveLayout::new(&config.archive.prefix),
                call_timeout,
                config.archive.verify_policy(call_timeout),
            ),
            store,
            call_timeout,
        })
    }

    pub fn resolver(&self) -> &SourcePathResolver {
        &self.resolver
    }

    pub fn writer(&self) -> &CatalogWriter {
        &self.writer
    }

    /// Ingest the batch for `target_date`. Never returns an error: failures
    /// are described by the result.
    pub async fn run(&self, target_date: &str) -> IngestionResult {
        let mut run = Invocation {
            id: Uuid::new_v4(),
            target_date: target_date.to_string(),
            started_at: Utc::now(),
            state: PipelineState::Start,
        };
        let span = info_span!(
            "ingest",
            invocation_id = %run.id,
            target_date = %target_date,
            table = %self.resolver.table()
        );

        async {
            let mut progress = Progress::default();
            let outcome = self.execute(&mut run, &mut progress).await;
            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    run.advance(PipelineState::Failed);
                    if err.kind() == ErrorKind::ArchiveError {
                        error!(
                            error = %err,
                            rows_committed = progress.rows_written.unwrap_or(0),
                            "Archiving failed after the partition was written; re-running is safe"
                        );
                    } else {
                        error!(error = %err, stage = %err.stage(), "Ingestion failed");
                    }
                    IngestionResult::failed(&run, progress, &err)
                }
            };
            info!(
                status = ?result.status,
                rows_inserted = result.rows_inserted,
                "Invocation finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run: &mut Invocation,
        progress: &mut Progress,
    ) -> Result<IngestionResult> {
        let (source, key) = self.resolver.resolve(&run.target_date)?;
        progress.key = Some(key.clone());
        run.advance(PipelineState::Resolved);
        info!(source = %source.uri(), partition = %key, "Resolved source");

        let loaded = self.reader.read(&source).await?;
        run.advance(PipelineState::Read);

        if loaded.batch.is_empty() {
            run.advance(PipelineState::NoData);
            info!("Source has no rows; nothing to write");
            return Ok(IngestionResult::no_data(run, key));
        }

        let mut batch = loaded.batch;
        batch.conform_partition(&key.column, key.value)?;
        let rows_inserted = self
            .writer
            .replace_partition(&key, Arc::new(batch))
            .await?;
        progress.rows_written = Some(rows_inserted);
        run.advance(PipelineState::Written);

        let record = self
            .archiver
            .archive(&source, loaded.size_bytes, &loaded.checksum)
            .await?;
        run.advance(PipelineState::Archived);

        Ok(IngestionResult::success(run, key, rows_inserted, record))
    }

    /// Run each distinct date once, oldest first.
    pub async fn run_many(&self, dates: &[String]) -> Vec<IngestionResult> {
        let distinct: BTreeSet<&str> = dates.iter().map(String::as_str).collect();
        if distinct.len() < dates.len() {
            warn!(
                requested = dates.len(),
                distinct = distinct.len(),
                "Duplicate dates dropped"
            );
        }

        let mut results = Vec::with_capacity(distinct.len());
        for date in distinct {
            results.push(self.run(date).await);
        }
        results
    }

    /// Dates with a source object waiting under the source prefix.
    pub async fn pending_dates(&self) -> Result<Vec<NaiveDate>> {
        let objects = bounded(
            self.call_timeout,
            self.store
                .list_objects(self.resolver.bucket(), &self.resolver.list_prefix()),
        )
        .await
        .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

        let dates: BTreeSet<NaiveDate> = objects
            .iter()
            .filter_map(|o| self.resolver.date_from_key(&o.key))
            .collect();
        Ok(dates.into_iter().collect())
    }

    /// Rows currently committed for `target_date`.
    pub async fn partition_status(&self, target_date: &str) -> Result<(PartitionKey, u64)> {
        let (_, key) = self.resolver.resolve(target_date)?;
        let rows = self.writer.partition_row_count(&key).await?;
        Ok((key, rows))
    }
}
