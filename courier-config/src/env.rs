// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// Loads settings from process environment variables.
///
/// With a prefix, only `PREFIX_*` variables are read and the prefix is
/// stripped: `COURIER_SLOW_DISPATCH_MS` becomes `slow_dispatch_ms`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load every matching variable, typed with [`scalar`].
    pub fn load(&self) -> Result<HashMap<String, Value>> {
        Ok(self.collect(env::vars()))
    }

    fn collect(&self, vars: impl Iterator<Item = (String, String)>) -> HashMap<String, Value> {
        vars.filter_map(|(key, value)| {
            let key = match &self.prefix {
                Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
                None => key.as_str(),
            };
            if key.is_empty() {
                return None;
            }
            Some((key.to_lowercase(), scalar(&value)))
        })
        .collect()
    }

    /// Load one variable by its unprefixed name.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let key = self.full_key(key);
        env::var(&key).map_err(|source| ConfigError::Env { key, source })
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Type a raw string value.
///
/// Booleans and numbers become JSON booleans and numbers so they deserialize
/// into typed settings; everything else stays a string.
pub fn scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(raw.to_string())
}
