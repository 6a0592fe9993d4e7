//! The plugin host.
//!
//! Plugins are separate executables. The host launches them, authenticates
//! them through the handshake, and exposes a thread-safe [`PluginHandle`]
//! for the two runner calls, `configure` and `eval`. During an eval the
//! host serves the reverse evidence channel: the plugin submits evidence
//! batches that the broker routes to the sink registered for that
//! evaluation.

pub mod broker;
pub mod error;
pub mod host;

pub use broker::{CallbackBroker, EvidenceSink, SinkError};
pub use error::{HostError, HostResult};
pub use host::{HostConfig, PluginHandle, PluginHost};
