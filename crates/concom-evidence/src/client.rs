//! Control-plane API client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use concom_proto::Evidence;

use crate::error::{EvidenceError, EvidenceResult};

/// Deadline on one heartbeat request.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT_VALUE: &str = concat!("concom/", env!("CARGO_PKG_VERSION"));

/// One heartbeat payload.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub uuid: Uuid,
    pub created: DateTime<Utc>,
}

/// Client for the evidence and heartbeat endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> EvidenceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| EvidenceError::SubmitFailed {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ship a batch of finalized evidence.
    pub async fn create_evidence(&self, evidence: &[Evidence]) -> EvidenceResult<()> {
        let url = format!("{}/api/evidence", self.base_url);
        debug!(url = %url, count = evidence.len(), "shipping evidence");

        let response = self
            .http
            .post(&url)
            .json(evidence)
            .send()
            .await
            .map_err(|e| EvidenceError::SubmitFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvidenceError::SubmitFailed {
                reason: format!("api answered {status}"),
            });
        }
        Ok(())
    }

    /// Post one heartbeat; the API acknowledges with `201 Created`.
    pub async fn heartbeat(&self, beat: &Heartbeat) -> EvidenceResult<()> {
        let url = format!("{}/api/heartbeat/", self.base_url);
        debug!(url = %url, "sending heartbeat");

        let response = self
            .http
            .post(&url)
            .timeout(HEARTBEAT_TIMEOUT)
            .json(beat)
            .send()
            .await
            .map_err(|e| EvidenceError::HeartbeatFailed {
                reason: e.to_string(),
            })?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(EvidenceError::HeartbeatFailed {
                reason: format!("api answered {}", response.status()),
            });
        }
        Ok(())
    }
}
