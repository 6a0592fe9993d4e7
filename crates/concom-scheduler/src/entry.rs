//! One scheduled entry and its run loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Error produced by a tick handler. Tick errors never propagate past the
/// tick boundary; they are recorded on the entry.
pub type TickError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The work an entry dispatches on each fire.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Run one tick. The token is cancelled when the scheduler stops;
    /// handlers should abort after their current call completes.
    async fn run(&self, token: CancellationToken) -> Result<(), TickError>;
}

/// Lifecycle state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    Firing,
    Running,
    Failed,
}

/// Health snapshot of one entry.
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub name: String,
    pub state: EntryState,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

pub(crate) struct Entry {
    name: String,
    schedule: cron::Schedule,
    handler: std::sync::Arc<dyn TickHandler>,
    state: Mutex<EntryState>,
    last_error: Mutex<Option<String>>,
    consecutive_failures: AtomicU32,
}

impl Entry {
    pub(crate) fn new(
        name: &str,
        schedule: cron::Schedule,
        handler: std::sync::Arc<dyn TickHandler>,
    ) -> Self {
        Self {
            name: name.to_string(),
            schedule,
            handler,
            state: Mutex::new(EntryState::Idle),
            last_error: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn status(&self) -> EntryStatus {
        EntryStatus {
            name: self.name.clone(),
            state: *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
        }
    }

    fn set_state(&self, state: EntryState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Sleep-fire-run until cancelled. Running the handler inline keeps at
    /// most one run in flight; fires that would land during a run are
    /// recomputed from the clock afterwards, which drops them.
    pub(crate) async fn run_loop(&self, dispatch: CancellationToken, runs: CancellationToken) {
        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.after(&now).next() else {
                debug!(entry = %self.name, "schedule has no future fire times");
                return;
            };
            let delay = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = dispatch.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if dispatch.is_cancelled() {
                return;
            }

            self.set_state(EntryState::Firing);
            debug!(entry = %self.name, "tick");
            let tick_token = runs.child_token();
            self.set_state(EntryState::Running);

            match self.handler.run(tick_token).await {
                Ok(()) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
                    self.set_state(EntryState::Idle);
                }
                Err(err) => {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(entry = %self.name, error = %err, failures, "tick failed");
                    *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(err.to_string());
                    // Failed is visible until the next fire overwrites it.
                    self.set_state(EntryState::Failed);
                }
            }
        }
    }
}
