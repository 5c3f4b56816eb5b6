use crate::clock::Clock;
use crate::model::RouteIngress;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Decides whether this router should hold off writing a route's status
/// because another writer keeps changing it.
pub trait ContentionTracker: Send + Sync {
    /// Read-only. `current` is this router's ingress as last seen, if any.
    fn is_change_contended(
        &self,
        id: &str,
        now: DateTime<Utc>,
        current: Option<&RouteIngress>,
    ) -> bool;

    /// Confirms `current` was written by this router and makes it the new
    /// baseline.
    fn clear(&self, id: &str, current: &RouteIngress);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContentionState {
    Candidate,
    Contended,
}

#[derive(Debug, Clone)]
struct TrackerElement {
    at: DateTime<Utc>,
    state: ContentionState,
    last: RouteIngress,
}

#[derive(Debug, Default)]
struct TrackerInner {
    ids: HashMap<String, TrackerElement>,
    contentions: usize,
}

#[derive(Debug, Clone)]
pub struct ContentionParams {
    /// How long a contention is remembered.
    pub expires: Duration,
    /// Above this many contentions in one interval every write is refused.
    pub max_contentions: usize,
    /// Logged when an interval saw contention. Empty disables the warning.
    pub message: String,
}

impl Default for ContentionParams {
    fn default() -> Self {
        Self {
            expires: Duration::from_secs(60),
            max_contentions: 5,
            message: String::new(),
        }
    }
}

fn max_expiry() -> TimeDelta {
    TimeDelta::days(365)
}

/// Tracks ingress changes made by other writers, keyed by route uid.
pub struct SimpleContentionTracker {
    params: ContentionParams,
    expires: TimeDelta,
    clock: Arc<dyn Clock>,
    inner: Mutex<TrackerInner>,
}

impl SimpleContentionTracker {
    pub fn new(params: ContentionParams, clock: Arc<dyn Clock>) -> Self {
        let expires = TimeDelta::from_std(params.expires)
            .unwrap_or_else(|_| max_expiry())
            .min(max_expiry());
        Self {
            params,
            expires,
            clock,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    pub fn params(&self) -> &ContentionParams {
        &self.params
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records that the ingress for `id` was observed as `current`.
    ///
    /// May run ahead of the reconciliation path; it only ever moves an entry
    /// towards `Contended`.
    pub fn changed(&self, id: &str, current: &RouteIngress) {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.contentions > self.params.max_contentions {
            trace!(uid = id, "max contentions reached, not tracking changes");
            return;
        }

        let Some(last) = inner.ids.get(id) else {
            inner.ids.insert(
                id.to_string(),
                TrackerElement {
                    at: now,
                    state: ContentionState::Candidate,
                    last: current.clone(),
                },
            );
            trace!(uid = id, "object is a candidate for contention");
            return;
        };

        if last.last.same_target(current) {
            trace!(uid = id, "object is unchanged");
            return;
        }

        let state = last.state;
        match state {
            ContentionState::Contended => {
                inner.contentions += 1;
                debug!(
                    event = "contention",
                    uid = id,
                    "contended object modified by another writer"
                );
            }
            ContentionState::Candidate => {
                inner.ids.insert(
                    id.to_string(),
                    TrackerElement {
                        at: now,
                        state: ContentionState::Contended,
                        last: current.clone(),
                    },
                );
                inner.contentions += 1;
                debug!(
                    event = "contention",
                    uid = id,
                    "object modified by another writer"
                );
            }
        }
    }

    /// Drops expired entries and recounts contentions.
    ///
    /// Contended entries go after one expiry, candidates after three.
    /// Returns the contention count seen before the recount.
    pub fn flush(&self) -> usize {
        let now = self.clock.now();
        let contention_expiration = now - self.expires;
        let tracker_expiration = contention_expiration - self.expires * 2;

        let mut inner = self.lock();
        let before = inner.ids.len();
        inner.ids.retain(|_, el| match el.state {
            ContentionState::Contended => el.at >= contention_expiration,
            ContentionState::Candidate => el.at >= tracker_expiration,
        });
        let removed = before - inner.ids.len();

        let observed = inner.contentions;
        if observed > 0 && !self.params.message.is_empty() {
            warn!(event = "contention", contentions = observed, "{}", self.params.message);
        }
        inner.contentions = inner
            .ids
            .values()
            .filter(|el| el.state == ContentionState::Contended)
            .count();

        if removed > 0 {
            debug!(removed, contentions = inner.contentions, "flushed contention tracker");
        }
        observed
    }

    pub fn contentions(&self) -> usize {
        self.lock().contentions
    }

    pub fn state_of(&self, id: &str) -> Option<ContentionState> {
        self.lock().ids.get(id).map(|el| el.state)
    }

    pub fn tracked(&self) -> usize {
        self.lock().ids.len()
    }
}

impl ContentionTracker for SimpleContentionTracker {
    fn is_change_contended(
        &self,
        id: &str,
        now: DateTime<Utc>,
        _current: Option<&RouteIngress>,
    ) -> bool {
        let inner = self.lock();

        if inner.contentions > self.params.max_contentions {
            return true;
        }

        let Some(last) = inner.ids.get(id) else {
            return false;
        };
        if last.at + self.expires < now {
            return false;
        }
        last.state == ContentionState::Contended
    }

    fn clear(&self, id: &str, current: &RouteIngress) {
        let mut inner = self.lock();
        if let Some(last) = inner.ids.get_mut(id) {
            last.last = current.clone();
            last.state = ContentionState::Candidate;
        }
    }
}

/// Tracker that never reports contention. Used when status writes are
/// disabled or a single writer is guaranteed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContentionTracker;

impl ContentionTracker for NoopContentionTracker {
    fn is_change_contended(&self, _: &str, _: DateTime<Utc>, _: Option<&RouteIngress>) -> bool {
        false
    }

    fn clear(&self, _: &str, _: &RouteIngress) {}
}
