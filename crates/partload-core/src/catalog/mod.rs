//! Table catalog collaborator
//!
//! The pipeline talks to the catalog through tagged [`Statement`]s rather
//! than SQL text: each backend renders them, so identifier quoting and the
//! partition predicate are decided in exactly one place per engine.

use crate::batch::RecordBatch;
use crate::partition::PartitionKey;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod duckdb;
pub mod memory;
pub mod writer;

pub use self::duckdb::{DuckDbCatalog, DuckDbTarget};
pub use memory::{CatalogOp, MemoryCatalog};
pub use writer::CatalogWriter;

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Failed to attach catalog '{catalog}': {reason}")]
    Attach { catalog: String, reason: String },

    #[error("Statement {statement} failed: {reason}")]
    Statement { statement: String, reason: String },

    #[error("Catalog call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to close catalog session: {0}")]
    Close(String),
}

/// Named catalog to attach, e.g. `glue_catalog`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogRef {
    pub name: String,
}

impl CatalogRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// Remove every row whose partition column equals the key's date.
    DeletePartition(PartitionKey),
    /// Insert every row of the batch into the key's table.
    InsertBatch {
        key: PartitionKey,
        batch: Arc<RecordBatch>,
    },
    /// Count the rows of one partition; `execute` returns the count.
    CountPartition(PartitionKey),
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::DeletePartition(_) => "delete_partition",
            Statement::InsertBatch { .. } => "insert_batch",
            Statement::CountPartition(_) => "count_partition",
        }
    }

    pub fn key(&self) -> &PartitionKey {
        match self {
            Statement::DeletePartition(key) | Statement::CountPartition(key) => key,
            Statement::InsertBatch { key, .. } => key,
        }
    }
}

/// A live session, owned by one invocation.
#[async_trait]
pub trait CatalogSession: Send {
    /// Rows affected, or the count for [`Statement::CountPartition`].
    async fn execute(&mut self, statement: &Statement) -> CatalogResult<u64>;

    async fn close(self: Box<Self>) -> CatalogResult<()>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn attach(&self, catalog: &CatalogRef) -> CatalogResult<Box<dyn CatalogSession>>;
}

/// Run `call`, failing with [`CatalogError::Timeout`] if it outlives `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> CatalogResult<T>
where
    F: Future<Output = CatalogResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CatalogError::Timeout(limit))?
}
