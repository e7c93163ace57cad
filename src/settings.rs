//! Process-wide settings.

use courier_bus::DispatchConfig;
use courier_config::{ConfigManager, Validate};
use courier_log::{LogConfig, LogFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a [`Runtime`](crate::Runtime) needs, loaded from one flat map.
///
/// With the `COURIER` prefix the environment keys are
/// `COURIER_SLOW_DISPATCH_MS`, `COURIER_ABORT_ON_CANCEL`,
/// `COURIER_REQUEST_TIMEOUT_MS`, `COURIER_LOG_LEVEL`, `COURIER_LOG_FORMAT`
/// and `COURIER_HOT_REGISTRATION`. Environment values override the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// Overrides the level derived from `COURIER_DEBUG`
    pub log_level: Option<LogLevel>,

    pub log_format: Option<LogFormat>,

    /// Keep the handler table open for registration after start-up
    pub hot_registration: bool,
}

impl Settings {
    /// Load from an optional file, then from `PREFIX_*` environment variables.
    pub fn load(prefix: Option<&str>, file: Option<&Path>) -> courier_config::Result<Self> {
        let manager = match prefix {
            Some(prefix) => ConfigManager::with_prefix(prefix.to_string()),
            None => ConfigManager::new(),
        };
        if let Some(file) = file {
            manager.load_file_auto(file)?;
        }
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    pub fn from_manager(manager: &ConfigManager) -> courier_config::Result<Self> {
        manager.load_validated()
    }

    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_env();
        if let Some(level) = self.log_level {
            config = config.level(level);
        }
        if let Some(format) = self.log_format {
            config = config.format(format);
        }
        config
    }
}

impl Validate for Settings {
    fn validate(&self) -> courier_config::Result<()> {
        self.dispatch.validate()
    }
}
