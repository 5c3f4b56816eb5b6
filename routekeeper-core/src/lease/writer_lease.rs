use super::Backoff;
use crate::shutdown::ShutdownSignal;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

pub type WorkFuture = Pin<Box<dyn Future<Output = WorkOutcome> + Send>>;

/// Work scheduled for a key. It may be invoked more than once when retried.
pub type WorkFn = Arc<dyn Fn() -> WorkFuture + Send + Sync>;

/// Wraps an async closure as a [`WorkFn`].
pub fn work_fn<F, Fut>(f: F) -> WorkFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkOutcome> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as WorkFuture)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LeaseState {
    Election,
    Leader,
    Follower,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WorkResult {
    /// The write landed or was confirmed. The key becomes Leader.
    Succeeded,
    /// The write did not land. Without retry the key becomes Follower.
    Failed,
    /// Nothing to decide, the lease state is left alone.
    Skipped,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WorkOutcome {
    pub result: WorkResult,
    pub retry: bool,
}

impl WorkOutcome {
    pub fn succeeded() -> Self {
        Self {
            result: WorkResult::Succeeded,
            retry: false,
        }
    }

    pub fn failed(retry: bool) -> Self {
        Self {
            result: WorkResult::Failed,
            retry,
        }
    }

    pub fn skipped() -> Self {
        Self {
            result: WorkResult::Skipped,
            retry: false,
        }
    }

    /// Succeeded, but re-arm the key after the retry interval.
    pub fn succeeded_and_rearm() -> Self {
        Self {
            result: WorkResult::Succeeded,
            retry: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == WorkResult::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct LeaseParams {
    /// How long a Leader may write without re-confirming. Also caps backoff.
    pub lease_duration: Duration,
    /// Delay before re-running work that succeeded but asked to be re-armed.
    pub retry_interval: Duration,
    pub backoff: Backoff,
}

impl Default for LeaseParams {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(60),
            retry_interval: Duration::from_secs(1),
            backoff: Backoff::default(),
        }
    }
}

struct Pending {
    id: u64,
    work: WorkFn,
}

struct KeyState {
    state: LeaseState,
    expires: Instant,
    tick: u32,
    pending: Option<Pending>,
    due: Instant,
    running: bool,
}

impl KeyState {
    fn new(now: Instant) -> Self {
        Self {
            state: LeaseState::Election,
            expires: now,
            tick: 0,
            pending: None,
            due: now,
            running: false,
        }
    }

    fn idle(&self) -> bool {
        self.pending.is_none() && !self.running
    }
}

#[derive(Default)]
struct LeaseTable {
    keys: HashMap<String, KeyState>,
    last_key: Option<String>,
    next_id: u64,
}

struct LeaseShared {
    params: LeaseParams,
    table: Mutex<LeaseTable>,
    wake: Notify,
    resolved: watch::Sender<u64>,
    stopped: AtomicBool,
}

enum Next {
    Run { key: String, id: u64, work: WorkFn },
    Sleep(Option<Instant>),
}

/// Per-key write scheduler with leader/follower outcome tracking.
///
/// At most one work function runs at a time. A `try_work` on a key that
/// already has work queued replaces it; one that arrives while the key's work
/// is running is picked up as soon as that run returns.
#[derive(Clone)]
pub struct WriteLease {
    shared: Arc<LeaseShared>,
}

impl WriteLease {
    pub fn new(params: LeaseParams) -> Self {
        let (resolved, _) = watch::channel(0);
        Self {
            shared: Arc::new(LeaseShared {
                params,
                table: Mutex::new(LeaseTable::default()),
                wake: Notify::new(),
                resolved,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn params(&self) -> &LeaseParams {
        &self.shared.params
    }

    fn table(&self) -> MutexGuard<'_, LeaseTable> {
        self.shared.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedules `work` for `key`. Never blocks past enqueue.
    pub fn try_work(&self, key: &str, work: WorkFn) {
        let now = Instant::now();
        let mut table = self.table();
        table.next_id += 1;
        let id = table.next_id;
        table.last_key = Some(key.to_string());

        let entry = table
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        let replaced = entry.pending.is_some();
        if !replaced && !entry.running {
            entry.due = match entry.state {
                LeaseState::Follower if entry.expires > now => entry.expires,
                _ => now,
            };
        }
        entry.pending = Some(Pending { id, work });
        trace!(key, replaced, state = ?entry.state, "lease work queued");
        drop(table);

        self.shared.wake.notify_one();
    }

    /// Refreshes the expiry of `key` without running work and drops any
    /// queued work that has not started.
    pub fn extend(&self, key: &str) {
        let now = Instant::now();
        let params = &self.shared.params;
        let mut table = self.table();
        let entry = table
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        match entry.state {
            LeaseState::Follower => {
                entry.tick = entry.tick.saturating_add(1);
                entry.expires = now + params.backoff.delay(entry.tick, params.lease_duration);
            }
            LeaseState::Leader | LeaseState::Election => {
                entry.state = LeaseState::Leader;
                entry.tick = 0;
                entry.expires = now + params.lease_duration;
            }
        }
        if !entry.running {
            entry.pending = None;
        }
        debug!(key, state = ?entry.state, "lease extended");
        drop(table);

        self.shared.resolved.send_modify(|g| *g += 1);
    }

    /// Forgets everything about `key`. An outcome of work already running
    /// for it is discarded. A waiter on `key` resolves as not Leader.
    pub fn remove(&self, key: &str) {
        let removed = self.table().keys.remove(key).is_some();
        if removed {
            self.shared.resolved.send_modify(|g| *g += 1);
        }
    }

    pub fn state(&self, key: &str) -> Option<LeaseState> {
        self.table().keys.get(key).map(|k| k.state)
    }

    /// Backoff step of `key`. Zero for a Leader.
    pub fn tick(&self, key: &str) -> Option<u32> {
        self.table().keys.get(key).map(|k| k.tick)
    }

    pub fn is_queued(&self, key: &str) -> bool {
        self.table()
            .keys
            .get(key)
            .is_some_and(|k| k.pending.is_some())
    }

    pub fn len(&self) -> usize {
        self.table().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with work queued or running.
    pub fn pending(&self) -> usize {
        self.table().keys.values().filter(|k| !k.idle()).count()
    }

    /// Waits up to `timeout` for every key to go idle. Returns whether it
    /// did.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.shared.resolved.subscribe();
        let idle = async {
            loop {
                rx.borrow_and_update();
                if self.pending() == 0 {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok() && self.pending() == 0
    }

    /// Outcome of the most recently tried key, once its queued work is done.
    /// A removed key, or one left in Election by skipped work, is not led.
    fn resolution(&self) -> Option<bool> {
        let table = self.table();
        let key = table.last_key.as_ref()?;
        let Some(entry) = table.keys.get(key) else {
            return Some(false);
        };
        if !entry.idle() {
            return None;
        }
        Some(entry.state == LeaseState::Leader)
    }

    /// Waits until the most recently tried key resolves and reports whether
    /// this process is its Leader.
    pub async fn wait(&self) -> bool {
        let mut rx = self.shared.resolved.subscribe();
        loop {
            rx.borrow_and_update();
            if let Some(leader) = self.resolution() {
                return leader;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// `None`.
    pub async fn wait_until(&self, timeout: Duration) -> Option<bool> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// Starts the worker. It stops on shutdown once any running work returns.
    pub fn spawn(&self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let lease = self.clone();
        tokio::spawn(async move { lease.run(shutdown).await })
    }

    async fn run(self, mut shutdown: ShutdownSignal) {
        debug!("write lease worker started");
        loop {
            if shutdown.is_triggered() {
                break;
            }

            match self.next() {
                Next::Run { key, id, work } => {
                    let outcome = work().await;
                    self.finish(&key, id, outcome, shutdown.is_triggered());
                }
                Next::Sleep(deadline) => {
                    let sleep = async {
                        match deadline {
                            Some(at) => sleep_until(at).await,
                            None => std::future::pending::<()>().await,
                        }
                    };
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = self.shared.wake.notified() => {}
                        _ = sleep => {}
                    }
                }
            }
        }
        self.shared.stopped.store(true, Ordering::Relaxed);
        debug!("write lease worker stopped");
    }

    /// Picks the key whose work is due first, or the instant to sleep until.
    fn next(&self) -> Next {
        let now = Instant::now();
        let mut table = self.table();
        let last_key = table.last_key.clone();

        // drop idle keys whose lease ran out
        table
            .keys
            .retain(|key, k| !(k.idle() && k.expires < now && last_key.as_ref() != Some(key)));

        let mut earliest: Option<(&String, Instant)> = None;
        for (key, k) in table.keys.iter() {
            if k.pending.is_none() || k.running {
                continue;
            }
            if earliest.is_none_or(|(_, due)| k.due < due) {
                earliest = Some((key, k.due));
            }
        }

        let Some((key, due)) = earliest else {
            return Next::Sleep(None);
        };
        if due > now {
            return Next::Sleep(Some(due));
        }

        let key = key.clone();
        let Some(entry) = table.keys.get_mut(&key) else {
            return Next::Sleep(None);
        };
        let Some(pending) = entry.pending.as_ref() else {
            return Next::Sleep(None);
        };
        let (id, work) = (pending.id, pending.work.clone());
        entry.running = true;
        Next::Run { key, id, work }
    }

    fn finish(&self, key: &str, id: u64, outcome: WorkOutcome, stopping: bool) {
        let now = Instant::now();
        let params = &self.shared.params;
        let mut table = self.table();
        let Some(entry) = table.keys.get_mut(key) else {
            trace!(key, "lease removed while work was running");
            drop(table);
            self.shared.resolved.send_modify(|g| *g += 1);
            return;
        };
        entry.running = false;

        // work replaced during the run is picked up immediately
        let replaced = entry.pending.as_ref().is_some_and(|p| p.id != id);
        if replaced {
            entry.due = now;
        }
        let finished = if replaced { None } else { entry.pending.take() };

        match outcome.result {
            WorkResult::Succeeded => {
                entry.state = LeaseState::Leader;
                entry.tick = 0;
                entry.expires = now + params.lease_duration;
            }
            WorkResult::Failed if outcome.retry => {
                entry.tick = entry.tick.saturating_add(1);
            }
            WorkResult::Failed => {
                match entry.state {
                    LeaseState::Follower => entry.tick = entry.tick.saturating_add(1),
                    LeaseState::Election | LeaseState::Leader => {
                        entry.state = LeaseState::Follower;
                        entry.tick = 0;
                    }
                }
                entry.expires = now + params.backoff.delay(entry.tick, params.lease_duration);
            }
            WorkResult::Skipped => {}
        }

        if outcome.retry && !stopping {
            if let Some(pending) = finished {
                entry.due = match outcome.result {
                    WorkResult::Succeeded => now + params.retry_interval,
                    _ => now + params.backoff.delay(entry.tick, params.lease_duration),
                };
                entry.pending = Some(pending);
            }
        } else if outcome.retry {
            debug!(key, "shutting down, retry suppressed");
        }

        debug!(
            key,
            result = ?outcome.result,
            retry = outcome.retry,
            state = ?entry.state,
            tick = entry.tick,
            "lease work finished"
        );
        drop(table);

        self.shared.resolved.send_modify(|g| *g += 1);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Relaxed)
    }
}
