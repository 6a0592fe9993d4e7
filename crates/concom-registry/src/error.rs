//! Error types for artifact resolution.

/// Errors while resolving an artifact reference to a local path.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Reading a local source failed for a reason other than "not found".
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry pull failed; retryable on a later reconciliation.
    #[error("failed to fetch {reference}: {reason}")]
    FetchFailed { reference: String, reason: String },

    /// The pulled archive could not be unpacked.
    #[error("failed to unpack {reference}: {reason}")]
    Archive { reference: String, reason: String },

    /// The source is neither an existing file nor a registry reference.
    #[error("source {reference:?} does not exist locally and is not a registry reference")]
    UnknownRefShape { reference: String },

    /// The pulled artifact is missing its expected entry.
    #[error("artifact {reference} has no {expected} entry after unpack")]
    MissingEntry { reference: String, expected: String },
}

impl ResolveError {
    /// Whether retrying on a later tick can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Io { .. })
    }
}

/// Result type for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
