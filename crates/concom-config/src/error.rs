//! Configuration error types.

/// Errors while loading or validating the agent configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to load config {path}: {reason}")]
    Load { path: String, reason: String },

    /// The configuration parsed but cannot be run.
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
