//! Dispatcher configuration.

use courier_config::{ConfigError, ConfigManager, ConfigValidator, Validate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime knobs for a [`Dispatcher`](crate::Dispatcher).
///
/// Loads from the flat configuration map, so with the `COURIER` prefix the
/// fields map to `COURIER_ABORT_ON_CANCEL`, `COURIER_SLOW_DISPATCH_MS` and
/// `COURIER_REQUEST_TIMEOUT_MS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Race each handler against the context and drop it once the context
    /// is canceled or expires.
    pub abort_on_cancel: bool,

    /// Dispatches slower than this are logged at warn level.
    pub slow_dispatch_ms: u64,

    /// Deadline applied to new request scopes, if any.
    pub request_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            abort_on_cancel: false,
            slow_dispatch_ms: 1_000,
            request_timeout_ms: None,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate from a configuration manager.
    pub fn from_manager(manager: &ConfigManager) -> courier_config::Result<Self> {
        manager.load_validated()
    }

    pub fn abort_on_cancel(mut self, enable: bool) -> Self {
        self.abort_on_cancel = enable;
        self
    }

    pub fn slow_dispatch(mut self, threshold: Duration) -> Self {
        self.slow_dispatch_ms = threshold.as_millis() as u64;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_dispatch_ms)
    }

    pub fn request_timeout_duration(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Validate for DispatchConfig {
    fn validate(&self) -> courier_config::Result<()> {
        if self.slow_dispatch_ms == 0 {
            return Err(ConfigError::Invalid(
                "slow_dispatch_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(timeout) = self.request_timeout_ms {
            ConfigValidator::in_range(timeout, 1, 3_600_000, "request_timeout_ms")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert!(!config.abort_on_cancel);
        assert_eq!(config.slow_threshold(), Duration::from_secs(1));
        assert!(config.request_timeout_duration().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::new()
            .abort_on_cancel(true)
            .slow_dispatch(Duration::from_millis(250))
            .request_timeout(Duration::from_secs(30));

        assert!(config.abort_on_cancel);
        assert_eq!(config.slow_dispatch_ms, 250);
        assert_eq!(config.request_timeout_duration(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_manager() {
        let manager = ConfigManager::new();
        manager.set("abort_on_cancel", true).unwrap();
        manager.set("request_timeout_ms", 5_000).unwrap();
        manager.set("unrelated_key", "ignored").unwrap();

        let config = DispatchConfig::from_manager(&manager).unwrap();
        assert!(config.abort_on_cancel);
        assert_eq!(config.slow_dispatch_ms, 1_000);
        assert_eq!(config.request_timeout_ms, Some(5_000));
    }

    #[test]
    fn test_validation_rejects_zero_threshold() {
        let manager = ConfigManager::new();
        manager.set("slow_dispatch_ms", 0).unwrap();

        let err = DispatchConfig::from_manager(&manager).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
