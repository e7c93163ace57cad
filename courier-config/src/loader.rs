// Configuration file loaders

use crate::env::scalar;
use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Json => "JSON",
            FileFormat::Toml => "TOML",
            FileFormat::Env => ".env",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of `path`; `.env` files have no extension.
    pub fn detect(path: &Path) -> Result<Self> {
        if path.file_name().is_some_and(|name| name == ".env") {
            return Ok(FileFormat::Env);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(FileFormat::from_extension)
            .ok_or_else(|| ConfigError::UnknownFormat(path.to_path_buf()))
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file name.
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        FileFormat::detect(path.as_ref()).map(Self::new)
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.parse(&content)
    }

    /// Parse `content`; the result is always a JSON object.
    pub fn parse(&self, content: &str) -> Result<Value> {
        let invalid = |message: String| ConfigError::Parse {
            format: self.format.as_str(),
            message,
        };
        let value = match self.format {
            FileFormat::Json => {
                serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?
            }
            FileFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
                serde_json::to_value(table).map_err(|e| invalid(e.to_string()))?
            }
            FileFormat::Env => parse_env(content),
        };

        if !value.is_object() {
            return Err(invalid("root must be a table of keys".to_string()));
        }
        Ok(value)
    }
}

fn parse_env(content: &str) -> Value {
    let mut map = serde_json::Map::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let raw = value.trim();
            let value = if raw.len() >= 2 && (raw.starts_with('"') || raw.starts_with('\'')) {
                Value::String(raw.trim_matches('"').trim_matches('\'').to_string())
            } else {
                scalar(raw)
            };
            map.insert(key, value);
        }
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let value = loader.parse(r#"{"slow_dispatch_ms": 250}"#).unwrap();
        assert_eq!(value["slow_dispatch_ms"], 250);
    }

    #[test]
    fn test_json_root_must_be_object() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(matches!(loader.parse("[1, 2]"), Err(ConfigError::Parse { format: "JSON", .. })));
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let value = loader
            .parse(
                r#"
                abort_on_cancel = true
                request_timeout_ms = 30000
                log_format = "compact"
            "#,
            )
            .unwrap();

        assert_eq!(value["abort_on_cancel"], true);
        assert_eq!(value["request_timeout_ms"], 30000);
        assert_eq!(value["log_format"], "compact");
    }

    #[test]
    fn test_parse_env() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let value = loader
            .parse(
                r#"
                # Comment
                SLOW_DISPATCH_MS=100
                export HOT_REGISTRATION=false
                GREETING="42"
            "#,
            )
            .unwrap();

        assert_eq!(value["slow_dispatch_ms"], 100);
        assert_eq!(value["hot_registration"], false);
        assert_eq!(value["greeting"], "42");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("yaml"), None);
        assert_eq!(FileFormat::detect(Path::new("config/.env")).unwrap(), FileFormat::Env);
        assert_eq!(FileFormat::detect(Path::new("courier.toml")).unwrap(), FileFormat::Toml);
        assert!(FileFormat::detect(Path::new("Makefile")).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let err = loader.load_file("/nonexistent/courier.json").unwrap_err();
        assert!(matches!(&err, ConfigError::Read { path, .. } if path.ends_with("courier.json")));
        assert!(err.to_string().starts_with("failed to read /nonexistent/courier.json: "));
    }

    #[test]
    fn test_errors_name_the_format() {
        let err = ConfigLoader::new(FileFormat::Toml).parse("slow_dispatch_ms = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
        assert!(err.to_string().starts_with("invalid TOML configuration: "));

        let err = ConfigLoader::auto("settings.yaml").err().unwrap();
        assert!(matches!(&err, ConfigError::UnknownFormat(path) if path == Path::new("settings.yaml")));
    }
}
