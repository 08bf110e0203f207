//! Configuration for the correlation engine and the gateway dispatcher.
//!
//! Loaded from environment variables with sensible defaults. Every value can
//! also be set in code through the `with_*` builders.

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Default wait before a correlated request is reported as timed out.
pub const DEFAULT_TXN_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default lifetime of a completion record in the store.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Default interval between store sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on a single outbound HTTP call.
pub const DEFAULT_GATEWAY_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Correlation engine configuration.
///
/// # Example
///
/// ```
/// use callback_correlation_runtime::CorrelationConfig;
/// use std::time::Duration;
///
/// let config = CorrelationConfig::new()
///     .with_txn_timeout(Duration::from_secs(2))
///     .with_retention(Duration::from_secs(60));
/// assert_eq!(config.txn_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// How long `correlate` waits for a delivery
    pub txn_timeout: Duration,
    /// How long a completion record stays readable after it was written
    pub retention: Duration,
    /// How often the background sweeper purges expired records
    pub sweep_interval: Duration,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            txn_timeout: DEFAULT_TXN_TIMEOUT,
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Set the wait deadline.
    #[must_use]
    pub const fn with_txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }

    /// Set the record retention window.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `CORRELATION_TXN_TIMEOUT_MS` (default 5000)
    /// - `CORRELATION_RETENTION_SECS` (default 300)
    /// - `CORRELATION_SWEEP_INTERVAL_SECS` (default 60)
    ///
    /// Unset or unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            txn_timeout: env::var("CORRELATION_TXN_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_TXN_TIMEOUT, Duration::from_millis),
            retention: env::var("CORRELATION_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_RETENTION, Duration::from_secs),
            sweep_interval: env::var("CORRELATION_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_SWEEP_INTERVAL, Duration::from_secs),
        }
    }
}

/// Gateway endpoint configuration for [`HttpDispatcher`](crate::HttpDispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the gateway, without a trailing slash
    pub base_url: String,
    /// Bound on a single outbound call
    pub request_timeout: Duration,
    /// Client id sent as `X-CM-ID` when set
    pub client_id: Option<String>,
}

impl GatewayConfig {
    /// Create a configuration for `base_url` with default timeout and no client id.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_GATEWAY_REQUEST_TIMEOUT,
            client_id: None,
        }
    }

    /// Set the outbound call timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the client id header value.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `GATEWAY_BASE_URL` (required)
    /// - `GATEWAY_REQUEST_TIMEOUT_MS` (default 5000)
    /// - `GATEWAY_CLIENT_ID` (optional)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `GATEWAY_BASE_URL` is unset and
    /// [`ConfigError::Invalid`] if the timeout is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env::var("GATEWAY_BASE_URL").map_err(|_| ConfigError::Missing("GATEWAY_BASE_URL"))?;

        let request_timeout = match env::var("GATEWAY_REQUEST_TIMEOUT_MS") {
            Ok(value) => value
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    name: "GATEWAY_REQUEST_TIMEOUT_MS",
                    value,
                })?,
            Err(_) => DEFAULT_GATEWAY_REQUEST_TIMEOUT,
        };

        let mut config = Self::new(base_url).with_request_timeout(request_timeout);
        config.client_id = env::var("GATEWAY_CLIENT_ID").ok().filter(|id| !id.trim().is_empty());
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CorrelationConfig::default();
        assert_eq!(config.txn_timeout, Duration::from_millis(5000));
        assert_eq!(config.retention, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn builders_override_fields() {
        let config = CorrelationConfig::new()
            .with_txn_timeout(Duration::from_millis(250))
            .with_sweep_interval(Duration::from_secs(5));
        assert_eq!(config.txn_timeout, Duration::from_millis(250));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.retention, DEFAULT_RETENTION);
    }

    #[test]
    fn gateway_base_url_is_normalized() {
        let config = GatewayConfig::new("https://gateway.example/")
            .with_client_id("hip-1")
            .with_request_timeout(Duration::from_secs(1));
        assert_eq!(config.base_url, "https://gateway.example");
        assert_eq!(config.client_id.as_deref(), Some("hip-1"));
        assert_eq!(config.request_timeout, Duration::from_secs(1));
    }
}
