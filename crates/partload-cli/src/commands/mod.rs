//! Command implementations

pub mod backfill;
pub mod pending;
pub mod run;
pub mod status;
