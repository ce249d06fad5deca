//! Source archiving
//!
//! The consumed object is copied under a date-partitioned archive prefix,
//! the copy is confirmed visible with the expected size, and only then is the
//! original removed. A crash anywhere before the delete leaves the source in
//! place for the next run.

use crate::error::{IngestError, Result};
use crate::partition::SourceObject;
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::storage::{bounded, ObjectMeta, ObjectStore};
use chrono::{DateTime, NaiveDate, Utc};
use partload_common::checksum::ContentDigest;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// `{prefix}/{YYYY}/{MM}/{DD}/{file name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    prefix: String,
}

impl ArchiveLayout {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn archive_key(&self, file_name: &str, day: NaiveDate) -> String {
        let dated = day.format("%Y/%m/%d");
        if self.prefix.is_empty() {
            format!("{}/{}", dated, file_name)
        } else {
            format!("{}/{}/{}", self.prefix, dated, file_name)
        }
    }
}

/// Evidence that a source object was moved to the archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveRecord {
    pub bucket: String,
    pub source_key: String,
    pub archive_key: String,
    pub moved_at: DateTime<Utc>,
    pub checksum: String,
    pub size_bytes: u64,
    /// The original could not be deleted after a verified copy.
    pub source_retained: bool,
}

pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    layout: ArchiveLayout,
    call_timeout: Duration,
    verify: PollPolicy,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        layout: ArchiveLayout,
        call_timeout: Duration,
        verify: PollPolicy,
    ) -> Self {
        Self {
            store,
            layout,
            call_timeout,
            verify,
        }
    }

    /// Move `source` into the archive. `size_bytes` and `checksum` describe
    /// the body that was ingested; a copy of a different size is rejected.
    #[instrument(skip(self, source, checksum), fields(source_key = %source.key))]
    pub async fn archive(
        &self,
        source: &SourceObject,
        size_bytes: u64,
        checksum: &ContentDigest,
    ) -> Result<ArchiveRecord> {
        let archive_key = self
            .layout
            .archive_key(source.file_name(), Utc::now().date_naive());

        bounded(
            self.call_timeout,
            self.store
                .copy_object(&source.bucket, &source.key, &archive_key),
        )
        .await
        .map_err(|e| IngestError::Archive(format!("copy to {} failed: {}", archive_key, e)))?;

        self.verify_copy(&source.bucket, &archive_key, size_bytes)
            .await?;

        let source_retained = match bounded(
            self.call_timeout,
            self.store.delete_object(&source.bucket, &source.key),
        )
        .await
        {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    error = %e,
                    archive_key = %archive_key,
                    "Source retained after archiving; two copies exist until it is removed"
                );
                true
            }
        };

        info!(archive_key = %archive_key, source_retained, "Source archived");

        Ok(ArchiveRecord {
            bucket: source.bucket.clone(),
            source_key: source.key.clone(),
            archive_key,
            moved_at: Utc::now(),
            checksum: checksum.to_string(),
            size_bytes,
            source_retained,
        })
    }

    async fn verify_copy(&self, bucket: &str, archive_key: &str, size_bytes: u64) -> Result<()> {
        let outcome = poll_until(
            &self.verify,
            || bounded(self.call_timeout, self.store.head_object(bucket, archive_key)),
            |meta: &Option<ObjectMeta>| meta.as_ref().is_some_and(|m| m.size == size_bytes),
        )
        .await
        .map_err(|e| IngestError::Archive(format!("verifying {} failed: {}", archive_key, e)))?;

        match outcome {
            PollOutcome::Terminal { .. } => Ok(()),
            PollOutcome::Exhausted { last, attempts } => Err(IngestError::Archive(match last {
                Some(meta) => format!(
                    "archived copy {} has {} bytes, expected {} (after {} checks)",
                    archive_key, meta.size, size_bytes, attempts
                ),
                None => format!(
                    "archived copy {} not visible after {} checks",
                    archive_key, attempts
                ),
            })),
            PollOutcome::TimedOut => Err(IngestError::Archive(format!(
                "archived copy {} not confirmed within {:?}",
                archive_key, self.verify.timeout
            ))),
        }
    }
}
