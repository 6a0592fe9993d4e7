//! The agent orchestrator.
//!
//! Owns everything: the validated configuration, the artifact resolver,
//! the plugin host, the evidence shipper, and (in daemon mode) the
//! scheduler and heartbeat. One-shot mode walks the plugins once and
//! exits; daemon mode runs schedules until a signal arrives, and a config
//! file change cancels and rebuilds the whole run rather than patching it
//! in place.

pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod orchestrator;
pub mod sd_notify;
pub mod sink;
pub mod state;
pub mod tick;
pub mod watch;

pub use error::{AgentError, AgentResult};
pub use identity::AgentIdentity;
pub use orchestrator::{Agent, AgentOptions};
