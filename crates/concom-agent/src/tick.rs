//! The scheduled tick of one plugin.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use concom_config::PluginSpec;
use concom_scheduler::{TickError, TickHandler};

use crate::state::RunState;

/// Dispatches one plugin run per fire, under the shared reconciliation
/// lock. Carries a snapshot of the plugin spec taken at registration time;
/// config changes rebuild the scheduler rather than mutating entries.
pub struct PluginTickHandler {
    name: String,
    spec: PluginSpec,
    state: Arc<RunState>,
}

impl PluginTickHandler {
    pub fn new(name: &str, spec: PluginSpec, state: Arc<RunState>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            state,
        }
    }
}

#[async_trait]
impl TickHandler for PluginTickHandler {
    async fn run(&self, token: CancellationToken) -> Result<(), TickError> {
        let _shared = self.state.reconcile_lock.read().await;
        self.state.run_plugin(&self.name, &self.spec, token).await?;
        Ok(())
    }
}
