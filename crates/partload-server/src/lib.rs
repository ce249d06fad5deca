//! HTTP surface for partload ingestion runs

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod middleware;
pub mod routes;

pub use routes::{router, AppState};
