//! Plugin host error types.

/// Errors from launching or talking to a plugin subprocess.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The subprocess could not be spawned.
    #[error("failed to launch plugin {path}: {reason}")]
    Launch { path: String, reason: String },

    /// The child did not identify itself as a concom plugin.
    #[error("plugin handshake failed for {path}: {reason}")]
    HandshakeFailed { path: String, reason: String },

    /// The subprocess died while a call was outstanding.
    #[error("plugin subprocess crashed: {reason}")]
    SubprocessCrashed { reason: String },

    /// The plugin rejected its configuration.
    #[error("plugin configure failed: {reason}")]
    ConfigureFailed { reason: String },

    /// A runner call failed at the RPC layer.
    #[error("plugin rpc failed: {reason}")]
    Rpc { reason: String },

    /// The handle was closed and cannot be used anymore.
    #[error("plugin handle is closed")]
    Closed,
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
