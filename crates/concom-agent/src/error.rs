//! Orchestrator error types.

/// Top-level agent errors. Component errors pass through unchanged so the
/// CLI can report their own messages.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] concom_config::ConfigError),

    #[error(transparent)]
    Resolve(#[from] concom_registry::ResolveError),

    #[error(transparent)]
    Schedule(#[from] concom_scheduler::SchedulerError),

    #[error(transparent)]
    Host(#[from] concom_host::HostError),

    #[error(transparent)]
    Evidence(#[from] concom_evidence::EvidenceError),

    #[error(transparent)]
    Proto(#[from] concom_proto::ProtoError),

    /// A plugin run failed inside a tick or a one-shot pass.
    #[error("plugin {name} run failed: {reason}")]
    PluginRun { name: String, reason: String },

    /// The config file watcher could not be set up.
    #[error("config watch failed: {reason}")]
    Watch { reason: String },
}

/// Result type for orchestrator operations.
pub type AgentResult<T> = Result<T, AgentError>;
