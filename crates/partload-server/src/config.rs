//! Server configuration

use partload_common::env::{env_or, env_parse};
use partload_core::config::PipelineConfig;
use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            host: env_or("PARTLOAD_HOST", DEFAULT_SERVER_HOST),
            port: env_parse("PARTLOAD_PORT", DEFAULT_SERVER_PORT)?,
            shutdown_timeout_secs: env_parse(
                "PARTLOAD_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }
        if self.host.trim().is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load `.env`, then the server and pipeline settings.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            server: ServerConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_server_defaults() {
        std::env::remove_var("PARTLOAD_HOST");
        std::env::remove_var("PARTLOAD_PORT");
        std::env::remove_var("PARTLOAD_SHUTDOWN_TIMEOUT_SECS");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.shutdown_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_server_port_override_and_validation() {
        std::env::set_var("PARTLOAD_PORT", "9100");
        assert_eq!(ServerConfig::from_env().unwrap().port, 9100);

        std::env::set_var("PARTLOAD_PORT", "0");
        assert!(ServerConfig::from_env().is_err());

        std::env::set_var("PARTLOAD_PORT", "http");
        assert!(ServerConfig::from_env().is_err());

        std::env::remove_var("PARTLOAD_PORT");
    }
}
