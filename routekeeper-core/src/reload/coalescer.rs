use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info};

/// The expensive operation being coalesced: persist state and reload the
/// backend process.
#[async_trait]
pub trait ReloadTarget: Send + Sync {
    async fn reload(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ReloadIntervals {
    /// Minimum time between the starts of two reloads.
    pub interval: Duration,
    /// Minimum time between the end of one reload and the start of the next.
    pub gap: Duration,
    /// Settle time after the first request of a burst.
    pub event_wait: Duration,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReloadPhase {
    Idle,
    Pending,
    Committing,
}

#[derive(Debug)]
struct CoalescerState {
    phase: ReloadPhase,
    /// Earliest request not yet served.
    requested_at: Option<Instant>,
    last_start: Option<Instant>,
    last_end: Option<Instant>,
    reloads: u64,
}

struct Shared {
    intervals: ReloadIntervals,
    target: Arc<dyn ReloadTarget>,
    state: Mutex<CoalescerState>,
    wake: Notify,
    completed: watch::Sender<u64>,
}

enum Step {
    Idle,
    Wait(Duration),
    /// The phase is already Committing, started at the given instant.
    Commit(Instant),
}

/// Turns bursts of reload requests into single reloads.
///
/// A reload starts once three windows have passed: `interval` since the
/// previous start, `gap` since the previous end, and `event_wait` since the
/// first request still waiting. Only one reload runs at a time.
#[derive(Clone)]
pub struct ReloadCoalescer {
    shared: Arc<Shared>,
}

impl ReloadCoalescer {
    pub fn new(target: Arc<dyn ReloadTarget>, intervals: ReloadIntervals) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                intervals,
                target,
                state: Mutex::new(CoalescerState {
                    phase: ReloadPhase::Idle,
                    requested_at: None,
                    last_start: None,
                    last_end: None,
                    reloads: 0,
                }),
                wake: Notify::new(),
                completed,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoalescerState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Requests a reload. Only the first request of a burst starts the
    /// settle window.
    pub fn invoke(&self) {
        let now = Instant::now();
        let mut state = self.state();
        if state.requested_at.is_none() {
            state.requested_at = Some(now);
        }
        if state.phase == ReloadPhase::Idle {
            state.phase = ReloadPhase::Pending;
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Forgets previous reload times so the first synced reload is not held
    /// back by the start-up reload.
    pub fn mark_synced(&self) {
        let mut state = self.state();
        state.last_start = None;
        state.last_end = None;
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Reloads right away, ignoring every window. Falls back to a normal
    /// request when a reload is already running.
    pub async fn commit_now(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state();
            if state.phase == ReloadPhase::Committing {
                drop(state);
                self.invoke();
                return Ok(());
            }
            state.phase = ReloadPhase::Committing;
        }

        let result = self.shared.target.reload().await;

        let mut state = self.state();
        state.reloads += 1;
        state.phase = if state.requested_at.is_some() {
            ReloadPhase::Pending
        } else {
            ReloadPhase::Idle
        };
        let reloads = state.reloads;
        drop(state);

        self.shared.completed.send_replace(reloads);
        self.shared.wake.notify_one();
        result
    }

    pub fn phase(&self) -> ReloadPhase {
        self.state().phase
    }

    /// Reloads finished so far, successful or not.
    pub fn reloads(&self) -> u64 {
        self.state().reloads
    }

    /// Waits until at least `count` reloads have finished.
    pub async fn wait_for_reloads(&self, count: u64) {
        let mut rx = self.shared.completed.subscribe();
        let _ = rx.wait_for(|done| *done >= count).await;
    }

    pub fn spawn(&self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let coalescer = self.clone();
        tokio::spawn(async move { coalescer.run(shutdown).await })
    }

    /// Decides what the scheduler does next. Claims the reload slot in the
    /// same critical section that finds it due, so `commit_now` cannot slip in
    /// between.
    fn next_step(&self) -> Step {
        let now = Instant::now();
        let mut state = self.state();
        let Some(requested_at) = state.requested_at else {
            return Step::Idle;
        };
        if state.phase != ReloadPhase::Pending {
            return Step::Idle;
        }

        let intervals = &self.shared.intervals;
        let remaining = |since: Option<Instant>, window: Duration| {
            since.map_or(Duration::ZERO, |at| window.saturating_sub(now.saturating_duration_since(at)))
        };
        let wait = remaining(state.last_start, intervals.interval)
            .max(remaining(state.last_end, intervals.gap))
            .max(remaining(Some(requested_at), intervals.event_wait));

        if !wait.is_zero() {
            return Step::Wait(wait);
        }
        state.phase = ReloadPhase::Committing;
        state.requested_at = None;
        state.last_start = Some(now);
        Step::Commit(now)
    }

    async fn run(self, mut shutdown: ShutdownSignal) {
        debug!("reload coalescer started");
        loop {
            match self.next_step() {
                Step::Commit(started) => self.commit(started).await,
                Step::Wait(wait) => {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = self.shared.wake.notified() => {}
                        _ = sleep(wait) => {}
                    }
                }
                Step::Idle => {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = self.shared.wake.notified() => {}
                    }
                }
            }
        }
        debug!("reload coalescer stopped");
    }

    async fn commit(&self, started: Instant) {
        let result = self.shared.target.reload().await;
        let took = started.elapsed();

        let mut state = self.state();
        state.last_end = Some(Instant::now());
        state.reloads += 1;
        state.phase = if state.requested_at.is_some() {
            ReloadPhase::Pending
        } else {
            ReloadPhase::Idle
        };
        let reloads = state.reloads;
        drop(state);

        match result {
            Ok(()) => info!(
                event = "reload",
                reloads,
                took_ms = took.as_millis() as u64,
                "backend reloaded"
            ),
            Err(err) => error!(event = "reload", reloads, error = %err, "backend reload failed"),
        }
        self.shared.completed.send_replace(reloads);
    }
}
