//! Evidence assembly and shipping.
//!
//! The assembler turns policy results and plugin-supplied context into
//! evidence records; the agent finalizes each record with the merged label
//! set and its deterministic seeded UUID before the API client ships it.

pub mod assembler;
pub mod client;
pub mod error;
pub mod identity;
pub mod labels;

pub use assembler::{assemble, finalize, PluginContext};
pub use client::{ApiClient, Heartbeat};
pub use error::{EvidenceError, EvidenceResult};
pub use identity::seeded_uuid;
pub use labels::{merge_labels, LABEL_AGENT, LABEL_PLUGIN, LABEL_POLICY, LABEL_POLICY_PATH};
