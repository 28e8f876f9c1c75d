//! Engine limits and timings.

use std::time::Duration;

use thiserror::Error;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DOWNLOAD_RATE_LIMIT, DRAIN_BUDGET, DRAIN_WAIT, MAX_HOST_CONNECTIONS,
    MAX_PARALLEL_CONNECTIONS, MAX_REDIRECTS, UPLOAD_RATE_LIMIT,
};
use crate::user_agent::default_user_agent;

/// Invalid [`TransferConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A connection cap of zero would never let a transfer start.
    #[error("invalid {field} value {value}: must be at least 1")]
    ZeroLimit {
        /// The offending field.
        field: &'static str,
        /// The rejected value.
        value: usize,
    },

    /// The per-host cap is larger than the total cap.
    #[error("max_host_connections ({host}) exceeds max_total_connections ({total})")]
    HostLimitExceedsTotal {
        /// Per-host cap.
        host: usize,
        /// Total cap.
        total: usize,
    },

    /// A timeout or drain duration of zero.
    #[error("invalid {field}: must be greater than zero")]
    ZeroDuration {
        /// The offending field.
        field: &'static str,
    },

    /// The user agent is empty.
    #[error("user agent must not be empty")]
    EmptyUserAgent,
}

/// Limits applied to every transfer run by a manager.
///
/// `Default` yields the compile-time constants from
/// [`constants`](super::constants). Rate limits are in bytes per second and
/// 0 disables pacing for that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Max connections across all transfers.
    pub max_total_connections: usize,
    /// Max connections to a single host.
    pub max_host_connections: usize,
    /// Timeout for the connection phase.
    pub connect_timeout: Duration,
    /// Upload pacing in bytes per second.
    pub upload_rate_limit: u64,
    /// Download pacing in bytes per second.
    pub download_rate_limit: u64,
    /// Redirects followed before failing.
    pub max_redirects: usize,
    /// Longest single wait while draining at shutdown.
    pub drain_wait: Duration,
    /// Wall-clock budget for the whole shutdown drain.
    pub drain_budget: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_total_connections: MAX_PARALLEL_CONNECTIONS,
            max_host_connections: MAX_HOST_CONNECTIONS,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            upload_rate_limit: UPLOAD_RATE_LIMIT,
            download_rate_limit: DOWNLOAD_RATE_LIMIT,
            max_redirects: MAX_REDIRECTS,
            drain_wait: DRAIN_WAIT,
            drain_budget: DRAIN_BUDGET,
            user_agent: default_user_agent(),
        }
    }
}

impl TransferConfig {
    /// Checks the values against what the engine can run with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_total_connections == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_total_connections",
                value: self.max_total_connections,
            });
        }
        if self.max_host_connections == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_host_connections",
                value: self.max_host_connections,
            });
        }
        if self.max_host_connections > self.max_total_connections {
            return Err(ConfigError::HostLimitExceedsTotal {
                host: self.max_host_connections,
                total: self.max_total_connections,
            });
        }
        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("drain_wait", self.drain_wait),
            ("drain_budget", self.drain_budget),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_constants() {
        let config = TransferConfig::default();
        assert_eq!(config.max_total_connections, 5);
        assert_eq!(config.max_host_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.upload_rate_limit, 1_000_000);
        assert_eq!(config.download_rate_limit, 1_000_000);
        assert_eq!(config.drain_wait, Duration::from_secs(1));
        assert_eq!(config.drain_budget, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_total_connections_rejected() {
        let config = TransferConfig {
            max_total_connections: 0,
            ..TransferConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLimit {
                field: "max_total_connections",
                value: 0
            })
        );
    }

    #[test]
    fn test_host_limit_above_total_rejected() {
        let config = TransferConfig {
            max_total_connections: 2,
            max_host_connections: 3,
            ..TransferConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HostLimitExceedsTotal { host: 3, total: 2 })
        ));
    }

    #[test]
    fn test_zero_drain_budget_rejected() {
        let config = TransferConfig {
            drain_budget: Duration::ZERO,
            ..TransferConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("drain_budget"), "got: {error}");
    }

    #[test]
    fn test_unlimited_rates_are_valid() {
        let config = TransferConfig {
            upload_rate_limit: 0,
            download_rate_limit: 0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
