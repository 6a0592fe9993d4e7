//! The heartbeat entry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use concom_evidence::{ApiClient, Heartbeat};
use concom_scheduler::{TickError, TickHandler};

use crate::identity::AgentIdentity;

/// Posts one heartbeat per fire. Failures are logged and recorded on the
/// entry; the schedule keeps running and there is no backoff.
pub struct HeartbeatHandler {
    api: Arc<ApiClient>,
    identity: AgentIdentity,
}

impl HeartbeatHandler {
    pub fn new(api: Arc<ApiClient>, identity: AgentIdentity) -> Self {
        Self { api, identity }
    }
}

#[async_trait]
impl TickHandler for HeartbeatHandler {
    async fn run(&self, _token: CancellationToken) -> Result<(), TickError> {
        let beat = Heartbeat {
            uuid: self.identity.uuid(),
            created: Utc::now(),
        };
        match self.api.heartbeat(&beat).await {
            Ok(()) => {
                debug!(uuid = %beat.uuid, "heartbeat accepted");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "heartbeat failed");
                Err(err.into())
            }
        }
    }
}
