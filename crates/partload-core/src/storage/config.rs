use partload_common::env::{env_opt, env_or, env_parse};
use serde::{Deserialize, Serialize};

/// Connection settings for the S3-compatible object store.
///
/// Credentials are optional: without them the AWS default chain is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env_opt("S3_ENDPOINT"),
            region: env_or("S3_REGION", "us-east-1"),
            access_key: env_opt("S3_ACCESS_KEY").or_else(|| env_opt("AWS_ACCESS_KEY_ID")),
            secret_key: env_opt("S3_SECRET_KEY").or_else(|| env_opt("AWS_SECRET_ACCESS_KEY")),
            path_style: env_parse("S3_PATH_STYLE", false)?,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000");
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
        assert!(config.path_style);
        assert!(config.has_static_credentials());
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_to_credential_chain() {
        for var in [
            "S3_ENDPOINT",
            "S3_ACCESS_KEY",
            "S3_SECRET_KEY",
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
        ] {
            std::env::remove_var(var);
        }
        std::env::set_var("S3_REGION", "eu-west-1");
        std::env::set_var("S3_PATH_STYLE", "true");

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert!(config.path_style);
        assert!(!config.has_static_credentials());

        std::env::set_var("S3_PATH_STYLE", "sometimes");
        assert!(StorageConfig::from_env().is_err());

        std::env::remove_var("S3_REGION");
        std::env::remove_var("S3_PATH_STYLE");
    }
}
