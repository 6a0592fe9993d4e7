//! Policy evaluation error types.

/// Errors while compiling or evaluating a policy bundle.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The bundle or a module inside it failed to compile.
    #[error("failed to compile policy bundle {bundle}: {reason}")]
    Compile { bundle: String, reason: String },

    /// A module evaluated to something other than a mapping, or a rule is
    /// structurally broken.
    #[error("policy module {file} is malformed: {reason}")]
    Schema { file: String, reason: String },

    /// A violation entry is not a JSON object.
    #[error("policy module {file} produced an undecodable violation: {reason}")]
    Decode { file: String, reason: String },
}

/// Result type for policy operations.
pub type PolicyEvalResult<T> = Result<T, PolicyError>;
