//! Shared fixtures for partload-core integration tests
//!
//! The in-process harness wires the orchestrator to [`MemoryObjectStore`]
//! and [`MemoryCatalog`]; [`TestMinio`] starts a real S3-compatible store
//! in Docker for the `#[ignore]`d container tests.

#![allow(dead_code)]

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use partload_core::batch::ColumnSpec;
use partload_core::catalog::MemoryCatalog;
use partload_core::config::PipelineConfig;
use partload_core::storage::MemoryObjectStore;
use partload_core::IngestionOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tracing::{debug, info};

pub const BUCKET: &str = "raw-landing";
pub const DATABASE: &str = "sales";
pub const TABLE: &str = "orders";
pub const TARGET_DATE: &str = "2024-03-10";
pub const SOURCE_KEY: &str = "orders/orders_2024-03-10.csv";

pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";

/// Three valid orders for 2024-03-10.
pub const ORDERS_CSV: &str = "\
order_id,customer_id,amount,order_date
1001,C-17,25.50,2024-03-10
1002,C-03,9.99,2024-03-10
1003,C-17,120.00,2024-03-10
";

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,partload_core=debug,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::new(BUCKET, DATABASE, TABLE);
    config.source.required_columns = vec![
        ColumnSpec::required("order_id"),
        ColumnSpec::required("amount"),
    ];
    config.source.optional_columns = vec![ColumnSpec::optional("customer_id")];
    config.call_timeout = Duration::from_secs(2);
    config.archive.verify_backoff_ms = 10;
    config
}

/// Orchestrator over in-process collaborators that the test keeps handles to.
pub struct Harness {
    pub store: MemoryObjectStore,
    pub catalog: MemoryCatalog,
    pub orchestrator: Arc<IngestionOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = MemoryObjectStore::new();
        let catalog = MemoryCatalog::new();
        let orchestrator = IngestionOrchestrator::new(
            &config,
            Arc::new(store.clone()),
            Arc::new(catalog.clone()),
        )
        .expect("test config is valid");

        Self {
            store,
            catalog,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn land(&self, key: &str, body: &str) {
        self.store.insert(BUCKET, key, body.as_bytes().to_vec());
    }

    pub fn land_orders(&self) {
        self.land(SOURCE_KEY, ORDERS_CSV);
    }

    pub fn partition_rows(&self, date: &str) -> usize {
        let (_, key) = self
            .orchestrator
            .resolver()
            .resolve(date)
            .expect("valid date");
        self.catalog.partition_rows(&key)
    }
}

/// Archive key the run is expected to produce today.
pub fn todays_archive_key(file_name: &str) -> String {
    format!(
        "archive/{}/{}",
        chrono::Utc::now().date_naive().format("%Y/%m/%d"),
        file_name
    )
}

// ============================================================================
// MinIO Test Container
// ============================================================================

/// MinIO container with one bucket created.
pub struct TestMinio {
    container: ContainerAsync<GenericImage>,
    client: S3Client,
    endpoint: String,
    bucket: String,
}

impl TestMinio {
    pub async fn start(bucket: &str) -> Result<Self> {
        info!("Starting MinIO test container...");

        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get MinIO host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get MinIO port")?;

        let endpoint = format!("http://{}:{}", host, port);
        debug!("MinIO endpoint: {}", endpoint);

        let s3_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::Credentials::new(
                MINIO_ACCESS_KEY,
                MINIO_SECRET_KEY,
                None,
                None,
                "static",
            ))
            .load()
            .await;
        let client = S3Client::from_conf(
            aws_sdk_s3::config::Builder::from(&s3_config)
                .force_path_style(true)
                .build(),
        );

        client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .context("Failed to create S3 bucket")?;

        Ok(Self {
            container,
            client,
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
