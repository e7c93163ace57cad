//! Errors raised while loading and reading configuration.

use std::env::VarError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing configuration key {0}")]
    KeyNotFound(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file name gives no supported format
    #[error("cannot detect configuration format of {0}")]
    UnknownFormat(PathBuf),

    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("invalid {format} configuration: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// A loaded value breaks a [`Validate`](crate::Validate) rule
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot store value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored value does not fit the requested type
    #[error("cannot read {target}: {source}")]
    Decode {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment variable {key}: {source}")]
    Env {
        key: String,
        #[source]
        source: VarError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
