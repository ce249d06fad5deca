//! Partitioned, idempotent ingestion of dated object-store batches into a
//! catalog-managed table.
//!
//! A run for one target date resolves the source key, reads and validates
//! the CSV batch, replaces the matching table partition (delete then insert)
//! and archives the source object (copy, verify, delete).
//!
//! ```no_run
//! use partload_core::{config::PipelineConfig, runtime::build_orchestrator};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = PipelineConfig::load()?;
//! let orchestrator = build_orchestrator(&config).await?;
//! let result = orchestrator.run("2024-03-10").await;
//! println!("{:?} {} rows", result.status, result.rows_inserted);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod adapter;
pub mod archive;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod poll;
pub mod runtime;
pub mod source;
pub mod storage;

pub use adapter::{InvocationAdapter, InvocationEvent, ResponseEnvelope};
pub use error::{ErrorKind, IngestError, Result, Stage};
pub use pipeline::{IngestStatus, IngestionOrchestrator, IngestionResult};
