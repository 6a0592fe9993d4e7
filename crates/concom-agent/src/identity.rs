//! Agent identity.
//!
//! Evidence UUIDs must be stable for the same agent across restarts and
//! distinct between agents running the same configuration, so the agent's
//! identity labels are derived from stable machine facts rather than a
//! per-process random value.

use std::collections::BTreeMap;

use uuid::Uuid;

use concom_evidence::{seeded_uuid, LABEL_AGENT};

/// Label carrying the host the agent runs on.
pub const LABEL_AGENT_HOST: &str = "_agent_host";

/// The agent's name in its own labels.
const AGENT_NAME: &str = "concom";

/// Stable identity of this agent deployment.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    labels: BTreeMap<String, String>,
    uuid: Uuid,
}

impl AgentIdentity {
    /// Identity from the local hostname.
    pub fn from_host() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(&host)
    }

    /// Identity for a named host; tests use this for determinism.
    pub fn new(host: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_AGENT.to_string(), AGENT_NAME.to_string());
        labels.insert(LABEL_AGENT_HOST.to_string(), host.to_string());

        // The heartbeat uuid is deterministic from the same identity.
        let mut seed = labels.clone();
        seed.insert("type".to_string(), "agent".to_string());
        let uuid = seeded_uuid(&seed);

        Self { labels, uuid }
    }

    /// Labels merged into every piece of evidence this agent ships.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// The agent's stable UUID, used in heartbeats.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}
