//! The evidence sink behind the callback broker.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use concom_evidence::{finalize, ApiClient};
use concom_host::{EvidenceSink, SinkError};
use concom_proto::Evidence;

/// Finalizes drafts (label merge + seeded UUID) and ships them to the
/// control plane. One sink is registered per eval.
pub struct ShippingSink {
    api: Arc<ApiClient>,
    agent_labels: BTreeMap<String, String>,
    plugin_labels: BTreeMap<String, String>,
}

impl ShippingSink {
    pub fn new(
        api: Arc<ApiClient>,
        agent_labels: BTreeMap<String, String>,
        plugin_labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            api,
            agent_labels,
            plugin_labels,
        }
    }
}

#[async_trait]
impl EvidenceSink for ShippingSink {
    async fn create_evidence(&self, evidence: Vec<Evidence>) -> Result<(), SinkError> {
        let batch: Vec<Evidence> = evidence
            .into_iter()
            .map(|draft| finalize(draft, &self.agent_labels, &self.plugin_labels))
            .collect();

        match self.api.create_evidence(&batch).await {
            Ok(()) => {
                info!(count = batch.len(), "evidence shipped");
                Ok(())
            }
            Err(err) => {
                // Not retried here: the next tick produces a fresh attempt.
                error!(error = %err, "evidence submission failed");
                Err(err.into())
            }
        }
    }
}
