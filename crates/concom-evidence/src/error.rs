//! Evidence shipping error types.

/// Errors while submitting evidence or heartbeats to the control plane.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// The evidence batch was not accepted.
    #[error("evidence submission failed: {reason}")]
    SubmitFailed { reason: String },

    /// The heartbeat was not accepted.
    #[error("heartbeat failed: {reason}")]
    HeartbeatFailed { reason: String },
}

/// Result type for evidence operations.
pub type EvidenceResult<T> = Result<T, EvidenceError>;
