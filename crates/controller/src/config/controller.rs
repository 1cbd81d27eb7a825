//! # Reconciliation Settings
//!
//! Settings that shape how reconcilers talk to brokers and schedule retries.

use super::env_var_or_default;
use crate::constants;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding `CFServiceBroker`, `CFServiceOffering` and `CFServicePlan` resources
    pub root_namespace: String,
    /// Per-request timeout for broker HTTP calls
    pub broker_request_timeout: Duration,
    /// Deadline for a single reconcile invocation
    /// On expiry the in-flight broker request is dropped and the reconcile is retried
    pub reconcile_timeout: Duration,
    /// Requeue delay while an asynchronous broker operation is in progress
    pub async_poll_interval: Duration,
    /// Accept invalid TLS certificates from brokers (development only)
    pub broker_skip_tls_verify: bool,
    /// Fibonacci error backoff bounds, in seconds
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            root_namespace: constants::DEFAULT_ROOT_NAMESPACE.to_owned(),
            broker_request_timeout: Duration::from_secs(
                constants::DEFAULT_BROKER_REQUEST_TIMEOUT_SECS,
            ),
            reconcile_timeout: Duration::from_secs(constants::DEFAULT_RECONCILE_TIMEOUT_SECS),
            async_poll_interval: Duration::from_secs(constants::DEFAULT_ASYNC_POLL_INTERVAL_SECS),
            broker_skip_tls_verify: false,
            backoff_min_secs: constants::DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: constants::DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff_min_secs = env_var_or_default("BACKOFF_MIN_SECS", defaults.backoff_min_secs);
        Self {
            root_namespace: env_var_or_default("ROOT_NAMESPACE", defaults.root_namespace),
            broker_request_timeout: Duration::from_secs(env_var_or_default(
                "BROKER_REQUEST_TIMEOUT_SECS",
                defaults.broker_request_timeout.as_secs(),
            )),
            reconcile_timeout: Duration::from_secs(env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                defaults.reconcile_timeout.as_secs(),
            )),
            async_poll_interval: Duration::from_secs(env_var_or_default(
                "ASYNC_POLL_INTERVAL_SECS",
                defaults.async_poll_interval.as_secs(),
            )),
            broker_skip_tls_verify: env_var_or_default(
                "BROKER_SKIP_TLS_VERIFY",
                defaults.broker_skip_tls_verify,
            ),
            backoff_min_secs,
            // max below min would make the backoff sequence meaningless
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", defaults.backoff_max_secs)
                .max(backoff_min_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.root_namespace, "cf");
        assert_eq!(config.async_poll_interval, Duration::from_secs(5));
        assert_eq!(config.reconcile_timeout, Duration::from_secs(60));
        assert!(!config.broker_skip_tls_verify);
    }

    #[test]
    fn unparsable_values_fall_back_to_default() {
        assert_eq!(
            crate::config::env_var_or_default("SBC_TEST_SURELY_UNSET_VARIABLE", 42u64),
            42
        );
    }
}
