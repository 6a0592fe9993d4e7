//! Cron scheduling.
//!
//! One entry per plugin plus one staggered heartbeat entry. Every entry is
//! its own loop: sleep until the next cron fire, run the handler, repeat.
//! A tick that would fire while the previous run is still going is
//! dropped, never queued, so each entry has at most one run in flight and
//! per-entry runs are totally ordered. Stopping is synchronous: once
//! `stop` returns no further ticks are dispatched, and in-flight runs get
//! a bounded grace period before their tokens are cancelled.

pub mod entry;
pub mod error;
pub mod expression;

pub use entry::{EntryState, EntryStatus, TickError, TickHandler};
pub use error::{SchedulerError, SchedulerResult};
pub use expression::{heartbeat_expression, parse_schedule, random_heartbeat_offset};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use entry::Entry;

/// Grace given to in-flight runs when the scheduler stops.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// How long cancelled runs get to unwind before their tasks are aborted.
const CANCEL_DRAIN: Duration = Duration::from_secs(1);

/// A set of cron entries sharing one lifecycle.
pub struct Scheduler {
    entries: Vec<Arc<Entry>>,
    /// Gates new fires; cancelled first on stop.
    dispatch: CancellationToken,
    /// Handed to running ticks; cancelled once the stop grace expires.
    runs: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    stop_grace: Duration,
}

impl Scheduler {
    /// A scheduler whose entries are cancelled from `parent` as well as by
    /// [`stop`](Self::stop).
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            entries: Vec::new(),
            dispatch: parent.child_token(),
            runs: parent.child_token(),
            tasks: std::sync::Mutex::new(Vec::new()),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Register an entry. Fails with [`SchedulerError::ScheduleInvalid`]
    /// when the expression does not parse.
    pub fn add_entry(
        &mut self,
        name: &str,
        expression: &str,
        handler: Arc<dyn TickHandler>,
    ) -> SchedulerResult<()> {
        let schedule = parse_schedule(name, expression)?;
        self.entries.push(Arc::new(Entry::new(name, schedule, handler)));
        Ok(())
    }

    /// Spawn the entry loops.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for entry in &self.entries {
            let entry = Arc::clone(entry);
            let dispatch = self.dispatch.clone();
            let runs = self.runs.clone();
            tasks.push(tokio::spawn(async move {
                entry.run_loop(dispatch, runs).await;
            }));
        }
        info!(entries = self.entries.len(), "scheduler started");
    }

    /// Stop dispatching. After this returns no further ticks fire;
    /// in-flight runs are given the grace period to complete, then their
    /// tokens are cancelled and stragglers are aborted.
    pub async fn stop(&self) {
        self.dispatch.cancel();
        let mut tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };

        if !drain(&mut tasks, self.stop_grace).await {
            debug!("in-flight runs exceeded the stop grace period, cancelling");
            self.runs.cancel();
            if !drain(&mut tasks, CANCEL_DRAIN).await {
                for task in &tasks {
                    task.abort();
                }
            }
        }
        info!("scheduler stopped");
    }

    /// Snapshot of every entry's state, for the health channel.
    pub fn statuses(&self) -> Vec<EntryStatus> {
        self.entries.iter().map(|entry| entry.status()).collect()
    }
}

/// Await all finished tasks within `window`; true when everything ended.
async fn drain(tasks: &mut Vec<JoinHandle<()>>, window: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + window;
    while let Some(task) = tasks.last_mut() {
        match tokio::time::timeout_at(deadline, &mut *task).await {
            Ok(_) => {
                tasks.pop();
            }
            Err(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        ticks: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl Counter {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                ticks: AtomicU32::new(0),
                delay,
                fail,
            })
        }

        fn count(&self) -> u32 {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TickHandler for Counter {
        async fn run(&self, token: CancellationToken) -> Result<(), TickError> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = token.cancelled() => {}
            }
            if self.fail {
                return Err("tick failed".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected_at_build_time() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root);
        let err = scheduler
            .add_entry("broken", "not a cron line", Counter::new(Duration::ZERO, false))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ScheduleInvalid { .. }));
    }

    #[tokio::test]
    async fn test_missed_ticks_are_dropped_while_running() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root).with_stop_grace(Duration::from_millis(100));
        // Fires every second but each run takes ~2.5 s: at most every
        // third fire can begin.
        let handler = Counter::new(Duration::from_millis(2500), false);
        scheduler
            .add_entry("slow", "* * * * * *", handler.clone())
            .unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(4200)).await;
        scheduler.stop().await;

        let ticks = handler.count();
        assert!(ticks >= 1, "entry never fired");
        assert!(ticks <= 2, "missed ticks were queued: {ticks} runs in ~4s");
    }

    #[tokio::test]
    async fn test_stop_prevents_further_ticks() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root).with_stop_grace(Duration::from_secs(1));
        let handler = Counter::new(Duration::ZERO, false);
        scheduler
            .add_entry("fast", "* * * * * *", handler.clone())
            .unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        scheduler.stop().await;

        let after_stop = handler.count();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(handler.count(), after_stop, "ticks fired after stop returned");
    }

    #[tokio::test]
    async fn test_failures_keep_the_entry_scheduled() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root).with_stop_grace(Duration::from_secs(1));
        let handler = Counter::new(Duration::ZERO, true);
        scheduler
            .add_entry("flaky", "* * * * * *", handler.clone())
            .unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        scheduler.stop().await;

        assert!(handler.count() >= 2, "failing entry was unscheduled");
        let statuses = scheduler.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].consecutive_failures >= 2);
        assert!(statuses[0].last_error.as_deref().unwrap_or_default().contains("tick failed"));
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_entries() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root).with_stop_grace(Duration::from_secs(1));
        let handler = Counter::new(Duration::ZERO, false);
        scheduler
            .add_entry("child", "* * * * * *", handler.clone())
            .unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        root.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let after_cancel = handler.count();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(handler.count(), after_cancel);
    }

    #[tokio::test]
    async fn test_entries_run_concurrently_across_plugins() {
        let root = CancellationToken::new();
        let mut scheduler = Scheduler::new(&root).with_stop_grace(Duration::from_millis(100));
        let slow = Counter::new(Duration::from_millis(2500), false);
        let fast = Counter::new(Duration::ZERO, false);
        scheduler.add_entry("slow", "* * * * * *", slow.clone()).unwrap();
        scheduler.add_entry("fast", "* * * * * *", fast.clone()).unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(3200)).await;
        scheduler.stop().await;

        // The slow entry must not hold the fast one back.
        assert!(fast.count() >= 2, "fast entry was blocked: {} ticks", fast.count());
    }
}
