
use crate::contention::ContentionTracker;
use crate::model::{Route, RouteIngress};
use crate::status::{RouteLister, RouteStatusClient, StatusError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Route cache and status endpoint in one. Failures are scripted up front;
/// once the script is empty every write succeeds and is stored.
#[derive(Default)]
pub(super) struct FakeApi {
    routes: Mutex<HashMap<String, Route>>,
    script: Mutex<VecDeque<StatusError>>,
    pub(super) attempts: AtomicUsize,
    writes: Mutex<Vec<Route>>,
}

impl FakeApi {
    pub(super) fn with(routes: &[Route]) -> Self {
        let api = Self::default();
        for r in routes {
            api.put(r.clone());
        }
        api
    }

    pub(super) fn put(&self, route: Route) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{}/{}", route.namespace(), route.name()), route);
    }

    pub(super) fn fail_with(&self, errors: impl IntoIterator<Item = StatusError>) {
        self.script.lock().unwrap().extend(errors);
    }

    pub(super) fn writes(&self) -> Vec<Route> {
        self.writes.lock().unwrap().clone()
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RouteLister for FakeApi {
    fn get(&self, namespace: &str, name: &str) -> Result<Route, StatusError> {
        let key = format!("{namespace}/{name}");
        self.routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(StatusError::NotFound(key))
    }
}

#[async_trait]
impl RouteStatusClient for FakeApi {
    async fn update_status(&self, route: &Route) -> Result<Route, StatusError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.writes.lock().unwrap().push(route.clone());
        self.put(route.clone());
        Ok(route.clone())
    }
}

/// Tracker whose verdict is set by the test and which records clears.
#[derive(Default)]
pub(super) struct ScriptedTracker {
    pub(super) contended: AtomicBool,
    clears: Mutex<Vec<(String, RouteIngress)>>,
    checks: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl ScriptedTracker {
    pub(super) fn contended() -> Self {
        let t = Self::default();
        t.contended.store(true, Ordering::SeqCst);
        t
    }

    pub(super) fn clears(&self) -> Vec<(String, RouteIngress)> {
        self.clears.lock().unwrap().clone()
    }

    pub(super) fn checks(&self) -> usize {
        self.checks.lock().unwrap().len()
    }
}

impl ContentionTracker for ScriptedTracker {
    fn is_change_contended(&self, id: &str, now: DateTime<Utc>, _: Option<&RouteIngress>) -> bool {
        self.checks.lock().unwrap().push((id.to_string(), now));
        self.contended.load(Ordering::SeqCst)
    }

    fn clear(&self, id: &str, current: &RouteIngress) {
        self.clears
            .lock()
            .unwrap()
            .push((id.to_string(), current.clone()));
    }
}
