use crate::model::{
    BackendRef, Endpoints, EventType, Node, ObjectMeta, Route, RouteKey, RouteSpec,
};
use crate::plugin::{Plugin, PluginError, RejectionRecorder};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub(crate) fn at(offset_secs: i64) -> DateTime<Utc> {
    base_time() + TimeDelta::seconds(offset_secs)
}

pub(crate) fn route(namespace: &str, name: &str, host: &str, created: DateTime<Utc>) -> Route {
    Route {
        meta: ObjectMeta {
            namespace: namespace.into(),
            name: name.into(),
            uid: format!("{namespace}-{name}-uid"),
            creation_timestamp: created,
            resource_version: 1,
        },
        spec: RouteSpec {
            host: host.into(),
            to: BackendRef {
                name: format!("{name}-svc"),
                weight: None,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn route_with_path(
    namespace: &str,
    name: &str,
    host: &str,
    path: &str,
    created: DateTime<Utc>,
) -> Route {
    let mut r = route(namespace, name, host, created);
    r.spec.path = path.into();
    r
}

/// Terminal plugin that remembers what reached it.
#[derive(Default)]
pub(crate) struct RecordingPlugin {
    pub(crate) routes: Mutex<Vec<(EventType, Route)>>,
    pub(crate) endpoints: Mutex<Vec<(EventType, Endpoints)>>,
    pub(crate) nodes: Mutex<Vec<(EventType, Node)>>,
    pub(crate) namespaces: Mutex<Vec<HashSet<String>>>,
    pub(crate) commits: AtomicUsize,
}

impl RecordingPlugin {
    pub(crate) fn route_events(&self) -> Vec<(EventType, RouteKey)> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .map(|(e, r)| (*e, r.key()))
            .collect()
    }

    pub(crate) fn last_route(&self) -> Option<(EventType, Route)> {
        self.routes.lock().unwrap().last().cloned()
    }

    pub(crate) fn deleted(&self) -> Vec<RouteKey> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == EventType::Deleted)
            .map(|(_, r)| r.key())
            .collect()
    }

    pub(crate) fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Plugin for RecordingPlugin {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        self.routes.lock().unwrap().push((event, route.clone()));
        Ok(())
    }

    fn handle_endpoints(&self, event: EventType, endpoints: &Endpoints) -> Result<(), PluginError> {
        self.endpoints.lock().unwrap().push((event, endpoints.clone()));
        Ok(())
    }

    fn handle_node(&self, event: EventType, node: &Node) -> Result<(), PluginError> {
        self.nodes.lock().unwrap().push((event, node.clone()));
        Ok(())
    }

    fn handle_namespaces(&self, namespaces: &HashSet<String>) -> Result<(), PluginError> {
        self.namespaces.lock().unwrap().push(namespaces.clone());
        Ok(())
    }

    fn commit(&self) -> Result<(), PluginError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub(crate) route: RouteKey,
    pub(crate) reason: String,
    pub(crate) message: String,
}

#[derive(Default)]
pub(crate) struct RecordingRecorder {
    pub(crate) rejections: Mutex<Vec<Rejection>>,
}

impl RecordingRecorder {
    pub(crate) fn all(&self) -> Vec<Rejection> {
        self.rejections.lock().unwrap().clone()
    }

    pub(crate) fn reasons_for(&self, route: &RouteKey) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|r| &r.route == route)
            .map(|r| r.reason)
            .collect()
    }
}

impl RejectionRecorder for RecordingRecorder {
    fn record_route_rejection(&self, route: &Route, reason: &str, message: &str) {
        self.rejections.lock().unwrap().push(Rejection {
            route: route.key(),
            reason: reason.into(),
            message: message.into(),
        });
    }
}
