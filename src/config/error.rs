//! Configuration Error Types
//!
//! Errors raised while locating, parsing and validating the TOML configuration.
//! Every variant names the file or field involved so a failed startup points
//! straight at the offending setting.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Base configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid TOML syntax or a value that does not deserialize
    #[error("Invalid configuration in '{file_path}': {error}")]
    ParseError { file_path: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Unknown name in a keyed section such as `jobs.<name>`
    #[error("Unknown configuration entry '{name}' in {section}")]
    UnknownEntry { name: String, section: String },

    /// JSON serialization errors when rendering the sanitized view
    #[error("JSON serialization error in {context}: {error}")]
    JsonSerializationError { context: String, error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn unknown_entry<N: Into<String>, S: Into<String>>(name: N, section: S) -> Self {
        Self::UnknownEntry {
            name: name.into(),
            section: section.into(),
        }
    }

    pub fn json_serialization_error<C: Into<String>, E: std::fmt::Display>(
        context: C,
        error: E,
    ) -> Self {
        Self::JsonSerializationError {
            context: context.into(),
            error: error.to_string(),
        }
    }

    /// Field the error refers to, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { field, .. } | Self::InvalidValue { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message_names_field() {
        let err = ConfigurationError::invalid_value("sync.max_retries", "0", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'sync.max_retries': must be greater than 0"
        );
        assert_eq!(err.field(), Some("sync.max_retries"));
    }

    #[test]
    fn test_not_found_lists_paths() {
        let err = ConfigurationError::config_file_not_found(vec![PathBuf::from("config/govsync.toml")]);
        assert!(err.to_string().contains("config/govsync.toml"));
        assert!(err.field().is_none());
    }
}
