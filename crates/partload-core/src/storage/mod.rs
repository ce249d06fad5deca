//! Object store collaborator
//!
//! The pipeline only needs a handful of object operations, each of which must
//! tell "the object is not there" apart from "the store could not answer".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::{MemoryObjectStore, StoreOp};
pub use s3::S3ObjectStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Object store request failed: {0}")]
    Transient(String),

    #[error("Object store request timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StoreResult<()>;

    /// Server-side copy within one bucket.
    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> StoreResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// `Ok(None)` when the object does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>>;

    /// Every key under `prefix`, in lexicographic order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;
}

/// Run `call`, failing with [`StoreError::Timeout`] if it outlives `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
