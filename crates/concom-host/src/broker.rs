//! The evidence callback broker.
//!
//! For the duration of one eval the host registers an evidence sink under
//! a fresh broker id. The id travels to the plugin inside the eval
//! request; evidence the plugin submits with that id is routed to the
//! registered sink, and the registration is torn down when the eval
//! returns. Because the reverse channel is the subprocess's own pipe, no
//! other process can reach the endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use concom_proto::Evidence;

/// Error produced by an evidence sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Receives evidence batches submitted during an eval.
///
/// Forwarding must be idempotent with respect to repeated identical
/// batches; deduplication is the sink's concern.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn create_evidence(&self, evidence: Vec<Evidence>) -> Result<(), SinkError>;
}

/// Routes evidence submissions to the sink of the owning eval.
#[derive(Default)]
pub struct CallbackBroker {
    next_id: AtomicU32,
    sinks: Mutex<HashMap<u32, Arc<dyn EvidenceSink>>>,
}

impl CallbackBroker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a sink for one eval and hand back its broker id.
    pub fn begin(&self, sink: Arc<dyn EvidenceSink>) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.insert(id, sink);
        }
        debug!(callback_id = id, "callback endpoint registered");
        id
    }

    /// Tear the endpoint down on eval return or cancellation.
    pub fn end(&self, id: u32) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.remove(&id);
        }
        debug!(callback_id = id, "callback endpoint released");
    }

    /// Deliver a batch to the sink registered under `id`.
    pub async fn dispatch(&self, id: u32, evidence: Vec<Evidence>) -> Result<(), SinkError> {
        let sink = self
            .sinks
            .lock()
            .ok()
            .and_then(|sinks| sinks.get(&id).cloned());

        match sink {
            Some(sink) => sink.create_evidence(evidence).await,
            None => {
                warn!(callback_id = id, "evidence for unknown callback endpoint");
                Err(format!("no callback endpoint with id {id}").into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Capture {
        batches: StdMutex<Vec<Vec<Evidence>>>,
    }

    #[async_trait]
    impl EvidenceSink for Capture {
        async fn create_evidence(&self, evidence: Vec<Evidence>) -> Result<(), SinkError> {
            self.batches.lock().unwrap().push(evidence);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_sink() {
        let broker = CallbackBroker::new();
        let sink = Arc::new(Capture::default());
        let id = broker.begin(sink.clone());

        broker.dispatch(id, Vec::new()).await.unwrap();
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_after_end_is_rejected() {
        let broker = CallbackBroker::new();
        let sink = Arc::new(Capture::default());
        let id = broker.begin(sink.clone());
        broker.end(id);

        assert!(broker.dispatch(id, Vec::new()).await.is_err());
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_distinct_per_eval() {
        let broker = CallbackBroker::new();
        let a = broker.begin(Arc::new(Capture::default()));
        let b = broker.begin(Arc::new(Capture::default()));
        assert_ne!(a, b);
    }
}
