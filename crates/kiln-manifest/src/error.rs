//! Error types for kiln front-end operations

use std::path::PathBuf;
use thiserror::Error;

use kiln_engine::BuildError;

/// Result type alias using KilnError
pub type Result<T> = std::result::Result<T, KilnError>;

/// Main error type for kiln front-end operations
#[derive(Debug, Error)]
pub enum KilnError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Manifest content errors
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Graph validation errors raised by the engine
    #[error(transparent)]
    Build(#[from] BuildError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors locating, parsing or validating the declaration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No declaration file in the directory or its parents
    #[error("No kiln.toml or kiln.yaml found in {0} or any parent directory")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors using a loaded manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest declares no targets, so there is no default goal
    #[error("No targets declared")]
    NoTargets,

    /// Writing the compile database failed
    #[error("Failed to write compile database to {path}: {source}")]
    CompileDb {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::InvalidValue {
            field: "settings.jobs".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: settings.jobs - must be at least 1"
        );
    }

    #[test]
    fn test_build_error_is_transparent() {
        let err: KilnError = BuildError::UnknownTarget("app".into()).into();
        assert_eq!(err.to_string(), "Unknown target 'app'");
    }
}
