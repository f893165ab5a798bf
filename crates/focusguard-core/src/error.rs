//! Core error types for focusguard-core.
//!
//! Every collaborator failure has its own enum so the component that caught
//! it can decide locally whether to log, retry, or fall back to the
//! unblocked state. Only validation failures are surfaced to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Network interception errors
    #[error("Rule apply error: {0}")]
    RuleApply(#[from] RuleApplyError),

    /// Deadline scheduler errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent key-value store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be read or written
    #[error("Store unavailable for key '{key}': {message}")]
    Unavailable { key: String, message: String },

    /// A stored value did not have the expected shape
    #[error("Malformed value for key '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },
}

/// Network interception API failures.
#[derive(Error, Debug)]
pub enum RuleApplyError {
    /// The API rejected a remove or add call
    #[error("Interception API rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// A rule with this id is already installed
    #[error("Rule id {0} is already installed")]
    DuplicateId(u32),

    /// The API's rule ceiling would be exceeded
    #[error("Rule limit exceeded: {requested} rules requested, limit is {limit}")]
    LimitExceeded { requested: usize, limit: usize },
}

/// Deadline scheduler failures.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The deadline could not be registered
    #[error("Failed to schedule deadline '{name}': {message}")]
    Failed { name: String, message: String },

    /// The deadline lies beyond what the scheduler can represent
    #[error("Deadline '{name}' is out of range")]
    OutOfRange { name: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to resolve the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Malformed block-list or whitelist pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Session duration must be positive and end within the representable range
    #[error("Invalid session duration: {0} seconds")]
    InvalidDuration(u64),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable {
            key: String::new(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::invalid_pattern("not a site", "no tld").into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("not a site"));
    }

    #[test]
    fn rule_apply_error_names_the_operation() {
        let err = RuleApplyError::Rejected {
            operation: "add",
            message: "quota".into(),
        };
        assert_eq!(err.to_string(), "Interception API rejected add: quota");
    }
}
