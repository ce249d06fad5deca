//! Partload CLI
//!
//! Operator commands for running and inspecting partition loads:
//!
//! - `run`: ingest one target date
//! - `backfill`: ingest a date range, a list of dates, or everything pending
//! - `pending`: list dates whose source object is waiting
//! - `status`: row count of a committed partition

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "partload")]
#[command(author, version, about = "Partitioned batch ingestion", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the batch for one date
    Run {
        /// Target date (YYYY-MM-DD)
        #[arg(short, long, env = "TARGET_DATE")]
        target_date: String,

        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ingest several dates, oldest first
    Backfill {
        /// First date of the range (inclusive)
        #[arg(long, requires = "to", conflicts_with_all = ["dates", "pending"])]
        from: Option<NaiveDate>,

        /// Last date of the range (inclusive)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Explicit dates, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with = "pending")]
        dates: Vec<String>,

        /// Every date with a waiting source object
        #[arg(long)]
        pending: bool,
    },

    /// List dates with a source object waiting
    Pending,

    /// Show the committed row count of a partition
    Status {
        /// Target date (YYYY-MM-DD)
        #[arg(short, long)]
        target_date: String,
    },
}

/// Dates from `from` to `to`, both included.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> anyhow::Result<Vec<String>> {
    if to < from {
        anyhow::bail!("--to {} is before --from {}", to, from);
    }
    Ok(from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["partload", "run", "--target-date", "2024-03-10", "--json"]).unwrap();
        match cli.command {
            Commands::Run { target_date, json } => {
                assert_eq!(target_date, "2024-03-10");
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_backfill_variants() {
        let cli = Cli::try_parse_from([
            "partload", "backfill", "--from", "2024-03-01", "--to", "2024-03-03",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Backfill { from: Some(_), to: Some(_), .. }));

        let cli = Cli::try_parse_from(["partload", "backfill", "--dates", "2024-03-01,2024-03-05"]).unwrap();
        match cli.command {
            Commands::Backfill { dates, .. } => assert_eq!(dates.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["partload", "backfill", "--from", "2024-03-01"]).is_err());
        assert!(Cli::try_parse_from(["partload", "backfill", "--pending", "--dates", "2024-03-01"]).is_err());
        assert!(Cli::try_parse_from(["partload", "backfill", "--from", "not-a-date", "--to", "2024-03-01"]).is_err());
    }

    #[test]
    fn test_date_range() {
        let from = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            date_range(from, to).unwrap(),
            vec!["2024-02-28", "2024-02-29", "2024-03-01"]
        );
        assert_eq!(date_range(to, to).unwrap(), vec!["2024-03-01"]);
        assert!(date_range(to, from).is_err());
    }
}
