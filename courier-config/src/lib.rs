//! Layered configuration for Courier services.
//!
//! Settings are kept in one flat key/value map. Later sources override
//! earlier ones, so the usual order is file, then `.env`, then process
//! environment.
//!
//! ```rust,ignore
//! use courier_config::{ConfigManager, FileFormat};
//!
//! let manager = ConfigManager::with_prefix("COURIER".to_string());
//! manager.load_file("courier.toml", FileFormat::Toml)?;
//! manager.load_env()?;
//!
//! let timeout: u64 = manager.get_or("request_timeout_ms", 30_000);
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Main configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: String) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: Some(prefix),
        }
    }

    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref()
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let env_vars = loader.load()?;

        self.config.write().extend(env_vars);
        Ok(())
    }

    /// Load a `.env` file into the process environment, then read it back
    /// through [`load_env`](Self::load_env).
    ///
    /// Without a path a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path)?;
        } else {
            dotenvy::dotenv().ok();
        }
        self.load_env()
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path)?;
        self.absorb(data);
        Ok(())
    }

    /// Load a file, picking the format from its name
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.absorb(data);
        Ok(())
    }

    fn absorb(&self, data: Value) {
        if let Value::Object(map) = data {
            self.config.write().extend(map);
        }
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|source| ConfigError::Encode {
            key: key.to_string(),
            source,
        })?;

        self.config.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .config
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|source| ConfigError::Decode {
            target: key.to_string(),
            source,
        })
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get(key)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    /// All configuration keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy every entry of `other` over this manager's entries
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.config, &other.config) {
            return;
        }
        let entries = other.config.read().clone();
        self.config.write().extend(entries);
    }

    /// Deserialize the whole map into `T` and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let json_value = Value::Object(
            self.config
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let validated: T = serde_json::from_value(json_value).map_err(|source| ConfigError::Decode {
            target: std::any::type_name::<T>().to_string(),
            source,
        })?;

        validated.validate()?;
        Ok(validated)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
