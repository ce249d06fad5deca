//! Partload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the partload workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Env**: typed environment variable lookups used by every config loader
//! - **Checksums**: content digests recorded when a source object is archived
//!
//! # Example
//!
//! ```no_run
//! use partload_common::env::{env_or, env_parse};
//!
//! fn timeout_secs() -> partload_common::Result<u64> {
//!     let region = env_or("S3_REGION", "us-east-1");
//!     println!("region: {region}");
//!     env_parse("CALL_TIMEOUT_SECS", 30)
//! }
//! ```

pub mod checksum;
pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
