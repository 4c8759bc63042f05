//! Error types for config loading and validation.

use thiserror::Error;

/// Result type alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating provider and cluster files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    Missing(&'static str),

    #[error("invalid group {group}: {reason}")]
    InvalidGroup { group: String, reason: String },

    #[error("invalid address range {range}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("invalid datastore pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown resource pool {pool} in cluster {cluster}")]
    UnknownResourcePool { cluster: String, pool: String },
}
