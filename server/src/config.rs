//! Service configuration.
//!
//! Loads every section from environment variables. Only `GATEWAY_BASE_URL`
//! is required; everything else has a default.

use callback_correlation_postgres::PostgresLedgerConfig;
use callback_correlation_runtime::{ConfigError, CorrelationConfig, GatewayConfig};
use std::env;
use std::net::SocketAddr;

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Load from `SERVER_HOST` (default `0.0.0.0`) and `SERVER_PORT` (default 8080).
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    /// Address to listen on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the host is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "SERVER_HOST",
                value: self.host.clone(),
            })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// Deadlines and retention
    pub correlation: CorrelationConfig,
    /// Outbound gateway
    pub gateway: GatewayConfig,
    /// Request ledger database
    pub postgres: PostgresLedgerConfig,
}

impl Config {
    /// Load every section from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the gateway section is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env(),
            correlation: CorrelationConfig::from_env(),
            gateway: GatewayConfig::from_env()?,
            postgres: PostgresLedgerConfig::from_env(),
        })
    }
}
