use super::{bounded, Catalog, CatalogError, CatalogRef, CatalogSession, Statement};
use crate::batch::RecordBatch;
use crate::error::{IngestError, Result};
use crate::partition::PartitionKey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Replaces one partition of the target table with a batch.
///
/// Delete and insert are two statements on one session, not one transaction:
/// a failed insert after a successful delete leaves the partition empty until
/// the next run. Re-running with the full batch always converges.
pub struct CatalogWriter {
    catalog: Arc<dyn Catalog>,
    catalog_ref: CatalogRef,
    call_timeout: Duration,
}

impl CatalogWriter {
    pub fn new(catalog: Arc<dyn Catalog>, catalog_ref: CatalogRef, call_timeout: Duration) -> Self {
        Self {
            catalog,
            catalog_ref,
            call_timeout,
        }
    }

    #[instrument(skip(self, batch), fields(partition = %key, rows = batch.num_rows()))]
    pub async fn replace_partition(&self, key: &PartitionKey, batch: Arc<RecordBatch>) -> Result<u64> {
        let mut session = self.open().await?;
        let outcome = self.delete_then_insert(session.as_mut(), key, batch).await;
        self.release(session, outcome.is_ok()).await;
        outcome
    }

    /// Rows currently committed for `key`.
    #[instrument(skip(self), fields(partition = %key))]
    pub async fn partition_row_count(&self, key: &PartitionKey) -> Result<u64> {
        let mut session = self.open().await?;
        let outcome = bounded(
            self.call_timeout,
            session.execute(&Statement::CountPartition(key.clone())),
        )
        .await
        .map_err(|e| IngestError::Write(e.to_string()));
        self.release(session, outcome.is_ok()).await;
        outcome
    }

    async fn open(&self) -> Result<Box<dyn CatalogSession>> {
        bounded(self.call_timeout, self.catalog.attach(&self.catalog_ref))
            .await
            .map_err(|e| IngestError::CatalogUnavailable(e.to_string()))
    }

    async fn delete_then_insert(
        &self,
        session: &mut dyn CatalogSession,
        key: &PartitionKey,
        batch: Arc<RecordBatch>,
    ) -> Result<u64> {
        let deleted = bounded(
            self.call_timeout,
            session.execute(&Statement::DeletePartition(key.clone())),
        )
        .await
        .map_err(|e| write_error("delete", e))?;
        debug!(deleted, "Existing partition rows deleted");

        let expected = batch.num_rows() as u64;
        let inserted = bounded(
            self.call_timeout,
            session.execute(&Statement::InsertBatch {
                key: key.clone(),
                batch,
            }),
        )
        .await
        .map_err(|e| {
            warn!(
                deleted,
                "Insert failed after delete; partition is empty until the next run"
            );
            write_error("insert", e)
        })?;

        if inserted != expected {
            warn!(inserted, expected, "Catalog reported an unexpected insert count");
        }
        info!(deleted, inserted, "Partition replaced");
        Ok(inserted)
    }

    async fn release(&self, session: Box<dyn CatalogSession>, succeeded: bool) {
        match bounded(self.call_timeout, session.close()).await {
            Ok(()) => debug!("Catalog session closed"),
            Err(e) if succeeded => warn!(error = %e, "Failed to close catalog session after a successful write"),
            Err(e) => debug!(error = %e, "Failed to close catalog session"),
        }
    }
}

fn write_error(step: &str, err: CatalogError) -> IngestError {
    IngestError::Write(format!("{} failed: {}", step, err))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::{Column, DataType, Value};
    use crate::catalog::{CatalogOp, MemoryCatalog};
    use crate::error::ErrorKind;
    use crate::partition::TableId;
    use chrono::NaiveDate;

    fn key() -> PartitionKey {
        PartitionKey::new(
            TableId::new("glue_catalog", "sales", "orders").unwrap(),
            "order_date",
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        )
        .unwrap()
    }

    fn batch(n: usize) -> Arc<RecordBatch> {
        Arc::new(
            RecordBatch::new(vec![Column::new(
                "order_date",
                DataType::Date,
                vec![Value::Date(key().value); n],
            )])
            .unwrap(),
        )
    }

    fn writer(catalog: &MemoryCatalog) -> CatalogWriter {
        CatalogWriter::new(
            Arc::new(catalog.clone()),
            CatalogRef::new("glue_catalog"),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_replace_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let writer = writer(&catalog);

        assert_eq!(writer.replace_partition(&key(), batch(3)).await.unwrap(), 3);
        assert_eq!(writer.replace_partition(&key(), batch(3)).await.unwrap(), 3);
        assert_eq!(writer.partition_row_count(&key()).await.unwrap(), 3);
        assert_eq!(catalog.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_never_inserts() {
        let catalog = MemoryCatalog::new();
        let writer = writer(&catalog);
        writer.replace_partition(&key(), batch(2)).await.unwrap();

        catalog.fail(CatalogOp::Delete);
        let err = writer.replace_partition(&key(), batch(5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteError);
        assert_eq!(catalog.calls(CatalogOp::Insert), 1);
        assert_eq!(catalog.partition_rows(&key()), 2);
        assert_eq!(catalog.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_attach_failure_is_catalog_unavailable() {
        let catalog = MemoryCatalog::new();
        catalog.fail(CatalogOp::Attach);
        let err = writer(&catalog)
            .replace_partition(&key(), batch(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CatalogUnavailable);
        assert_eq!(catalog.calls(CatalogOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_close_failure_after_write_is_not_fatal() {
        let catalog = MemoryCatalog::new();
        catalog.fail(CatalogOp::Close);
        let inserted = writer(&catalog)
            .replace_partition(&key(), batch(1))
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(catalog.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_insert_times_out_as_write_error() {
        let catalog = MemoryCatalog::new();
        catalog.delay(CatalogOp::Insert, Duration::from_secs(600));
        let err = writer(&catalog)
            .replace_partition(&key(), batch(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteError);
        assert!(err.to_string().contains("timed out"));
        assert_eq!(catalog.open_sessions(), 0);
    }
}
