//! Pipeline configuration

use crate::batch::{ColumnSpec, ExpectedSchema};
use crate::catalog::DuckDbTarget;
use crate::error::Result as IngestResult;
use crate::partition::TableId;
use crate::poll::PollPolicy;
use crate::storage::StorageConfig;
use partload_common::env::{env_list, env_opt, env_or, env_parse, env_required};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default key prefix of source objects.
pub const DEFAULT_SOURCE_PREFIX: &str = "orders";

/// Default file name prefix; objects are named `{prefix}_{date}.{ext}`.
pub const DEFAULT_SOURCE_FILE_PREFIX: &str = "orders";

/// Default source file extension.
pub const DEFAULT_SOURCE_FILE_EXTENSION: &str = "csv";

/// Default key prefix of archived objects.
pub const DEFAULT_ARCHIVE_PREFIX: &str = "archive";

/// Default catalog alias the target table lives in.
pub const DEFAULT_TARGET_CATALOG: &str = "glue_catalog";

/// Default partition column of the target table.
pub const DEFAULT_PARTITION_COLUMN: &str = "order_date";

/// Default DuckDB database for the local backend.
pub const DEFAULT_CATALOG_PATH: &str = ":memory:";

/// Default bound on every object-store and catalog call.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Default number of checks that an archived copy is visible.
pub const DEFAULT_ARCHIVE_VERIFY_ATTEMPTS: u32 = 5;

/// Default first backoff between archive checks.
pub const DEFAULT_ARCHIVE_VERIFY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub archive: ArchiveConfig,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub bucket: String,
    pub prefix: String,
    pub file_prefix: String,
    pub extension: String,
    pub required_columns: Vec<ColumnSpec>,
    pub optional_columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub catalog: String,
    pub database: String,
    pub table: String,
    pub partition_column: String,
}

impl TargetConfig {
    pub fn table_id(&self) -> IngestResult<TableId> {
        TableId::new(&self.catalog, &self.database, &self.table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub prefix: String,
    pub verify_attempts: u32,
    pub verify_backoff_ms: u64,
}

impl ArchiveConfig {
    /// Verification gives up once `call_timeout` has passed overall.
    pub fn verify_policy(&self, call_timeout: Duration) -> PollPolicy {
        let initial = Duration::from_millis(self.verify_backoff_ms);
        PollPolicy {
            max_attempts: self.verify_attempts,
            initial_backoff: initial,
            max_backoff: initial.saturating_mul(16),
            timeout: call_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    DuckDb,
    Iceberg,
}

impl std::str::FromStr for CatalogBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" | "local" => Ok(CatalogBackend::DuckDb),
            "iceberg" | "glue" => Ok(CatalogBackend::Iceberg),
            other => Err(format!("unknown catalog backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub backend: CatalogBackend,
    pub path: String,
    pub account_id: Option<String>,
    pub home_dir: Option<PathBuf>,
    /// DDL file run against the attached catalog at startup.
    pub init_sql: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn duckdb_target(&self) -> DuckDbTarget {
        match self.backend {
            CatalogBackend::Iceberg => DuckDbTarget::Iceberg {
                account_id: self.account_id.clone(),
            },
            CatalogBackend::DuckDb if self.path == DEFAULT_CATALOG_PATH => DuckDbTarget::Memory,
            CatalogBackend::DuckDb => DuckDbTarget::File(PathBuf::from(&self.path)),
        }
    }
}

fn parse_columns(var: &str, nullable: bool) -> anyhow::Result<Vec<ColumnSpec>> {
    env_list(var)
        .iter()
        .map(|raw| {
            ColumnSpec::parse(raw, nullable).map_err(|e| anyhow::anyhow!("{}: {}", var, e))
        })
        .collect()
}

impl PipelineConfig {
    /// Defaults for everything but the three identifiers with no sensible
    /// default.
    pub fn new(
        bucket: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            source: SourceConfig {
                bucket: bucket.into(),
                prefix: DEFAULT_SOURCE_PREFIX.to_string(),
                file_prefix: DEFAULT_SOURCE_FILE_PREFIX.to_string(),
                extension: DEFAULT_SOURCE_FILE_EXTENSION.to_string(),
                required_columns: Vec::new(),
                optional_columns: Vec::new(),
            },
            target: TargetConfig {
                catalog: DEFAULT_TARGET_CATALOG.to_string(),
                database: database.into(),
                table: table.into(),
                partition_column: DEFAULT_PARTITION_COLUMN.to_string(),
            },
            archive: ArchiveConfig {
                prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
                verify_attempts: DEFAULT_ARCHIVE_VERIFY_ATTEMPTS,
                verify_backoff_ms: DEFAULT_ARCHIVE_VERIFY_BACKOFF_MS,
            },
            catalog: CatalogConfig {
                backend: CatalogBackend::DuckDb,
                path: DEFAULT_CATALOG_PATH.to_string(),
                account_id: None,
                home_dir: None,
                init_sql: None,
            },
            storage: StorageConfig {
                endpoint: None,
                region: "us-east-1".to_string(),
                access_key: None,
                secret_key: None,
                path_style: false,
            },
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    /// Load `.env`, then the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            source: SourceConfig {
                bucket: env_required("SOURCE_BUCKET")?,
                prefix: env_or("SOURCE_PREFIX", DEFAULT_SOURCE_PREFIX),
                file_prefix: env_or("SOURCE_FILE_PREFIX", DEFAULT_SOURCE_FILE_PREFIX),
                extension: env_or("SOURCE_FILE_EXTENSION", DEFAULT_SOURCE_FILE_EXTENSION),
                required_columns: parse_columns("REQUIRED_COLUMNS", false)?,
                optional_columns: parse_columns("OPTIONAL_COLUMNS", true)?,
            },
            target: TargetConfig {
                catalog: env_or("TARGET_CATALOG", DEFAULT_TARGET_CATALOG),
                database: env_required("TARGET_DATABASE")?,
                table: env_required("TARGET_TABLE")?,
                partition_column: env_or("PARTITION_COLUMN", DEFAULT_PARTITION_COLUMN),
            },
            archive: ArchiveConfig {
                prefix: env_or("ARCHIVE_PREFIX", DEFAULT_ARCHIVE_PREFIX),
                verify_attempts: env_parse(
                    "ARCHIVE_VERIFY_ATTEMPTS",
                    DEFAULT_ARCHIVE_VERIFY_ATTEMPTS,
                )?,
                verify_backoff_ms: env_parse(
                    "ARCHIVE_VERIFY_BACKOFF_MS",
                    DEFAULT_ARCHIVE_VERIFY_BACKOFF_MS,
                )?,
            },
            catalog: CatalogConfig {
                backend: env_parse("CATALOG_BACKEND", CatalogBackend::DuckDb)?,
                path: env_or("CATALOG_PATH", DEFAULT_CATALOG_PATH),
                account_id: env_opt("CATALOG_ACCOUNT_ID"),
                home_dir: env_opt("CATALOG_HOME_DIR").map(PathBuf::from),
                init_sql: env_opt("CATALOG_INIT_SQL").map(PathBuf::from),
            },
            storage: StorageConfig::from_env()?,
            call_timeout: Duration::from_secs(env_parse(
                "CALL_TIMEOUT_SECS",
                DEFAULT_CALL_TIMEOUT_SECS,
            )?),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        // Identifiers end up in statements, so reject anything unquotable early
        self.target.table_id()?;
        crate::partition::validate_identifier("partition column", &self.target.partition_column)?;

        if self.source.bucket.trim().is_empty() {
            anyhow::bail!("Source bucket cannot be empty");
        }

        if self.call_timeout.is_zero() {
            anyhow::bail!("Call timeout must be greater than 0");
        }

        if self.archive.verify_attempts == 0 {
            anyhow::bail!("Archive verify attempts must be greater than 0");
        }

        if self.archive.prefix.trim_matches('/') == self.source.prefix.trim_matches('/') {
            anyhow::bail!(
                "Archive prefix '{}' must differ from the source prefix",
                self.archive.prefix
            );
        }

        if self.catalog.backend == CatalogBackend::Iceberg && self.catalog.account_id.is_none() {
            tracing::warn!("CATALOG_ACCOUNT_ID is not set - attaching the Iceberg catalog will fail");
        }

        Ok(())
    }

    /// Declared columns; the partition column is optional since the
    /// orchestrator fills it from the target date.
    pub fn expected_schema(&self) -> ExpectedSchema {
        self.source
            .required_columns
            .iter()
            .chain(self.source.optional_columns.iter())
            .cloned()
            .fold(
                ExpectedSchema::new(self.target.partition_column.clone()),
                ExpectedSchema::with_column,
            )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = PipelineConfig::new("raw", "sales", "orders");
        config.validate().unwrap();
        assert_eq!(config.source.prefix, "orders");
        assert_eq!(config.catalog.duckdb_target(), DuckDbTarget::Memory);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_identifiers_and_prefixes() {
        let mut config = PipelineConfig::new("raw", "sales", "orders; --");
        assert!(config.validate().is_err());

        config.target.table = "orders".into();
        config.archive.prefix = "orders/".into();
        assert!(config.validate().is_err());

        config.archive.prefix = "archive".into();
        config.call_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verify_policy_bounded_by_call_timeout() {
        let config = PipelineConfig::new("raw", "sales", "orders");
        let policy = config.archive.verify_policy(Duration::from_secs(7));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(200));
        assert_eq!(policy.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_expected_schema_from_columns() {
        let mut config = PipelineConfig::new("raw", "sales", "orders");
        config.source.required_columns = vec![ColumnSpec::required("order_id")];
        config.source.optional_columns = vec![ColumnSpec::optional("note")];
        let schema = config.expected_schema();
        assert_eq!(schema.partition_column(), "order_date");
        assert_eq!(schema.required_columns().count(), 1);
        assert!(schema.spec("NOTE").unwrap().nullable);
    }

    #[test]
    fn test_file_backend_target() {
        let mut config = PipelineConfig::new("raw", "sales", "orders");
        config.catalog.path = "/var/lib/partload/catalog.duckdb".into();
        assert_eq!(
            config.catalog.duckdb_target(),
            DuckDbTarget::File(PathBuf::from("/var/lib/partload/catalog.duckdb"))
        );
    }
}
