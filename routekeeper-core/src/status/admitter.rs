use super::{RouteLister, RouteStatusClient, StatusError, record_ingress_condition};
use crate::clock::Clock;
use crate::contention::ContentionTracker;
use crate::lease::{WorkOutcome, WriteLease, work_fn};
use crate::model::{Endpoints, EventType, Node, Route, RouteIngressCondition};
use crate::plugin::{Plugin, PluginError, RejectionRecorder};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unclassified write errors are retried this many times in one attempt.
const UPDATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub router_name: String,
    /// Published so clients can find the router that serves a route.
    pub canonical_hostname: String,
}

/// Performs the status writes scheduled by [`StatusAdmitter`].
pub struct StatusWriter {
    options: StatusOptions,
    client: Arc<dyn RouteStatusClient>,
    lister: Arc<dyn RouteLister>,
    tracker: Arc<dyn ContentionTracker>,
    lease: WriteLease,
    clock: Arc<dyn Clock>,
}

impl StatusWriter {
    /// Writes `condition` for the route `namespace/name` if it still carries
    /// the uid `key`.
    ///
    /// Works on a fresh copy from the lister and re-checks contention against
    /// it before writing.
    pub async fn perform_update(
        &self,
        action: &'static str,
        key: &str,
        namespace: &str,
        name: &str,
        condition: &RouteIngressCondition,
    ) -> WorkOutcome {
        let router = self.options.router_name.as_str();
        let mut attempts = UPDATE_ATTEMPTS;

        loop {
            let mut route = match self.lister.get(namespace, name) {
                Ok(route) => route,
                Err(err) => {
                    debug!(action, uid = key, error = %err, "route gone before status update");
                    return WorkOutcome::skipped();
                }
            };
            if route.uid() != key {
                debug!(action, uid = key, route = %route.key(), "route recreated, skipping status update");
                return WorkOutcome::skipped();
            }

            let now = self.clock.now();
            let change = record_ingress_condition(
                &mut route,
                router,
                &self.options.canonical_hostname,
                condition,
                now,
            );

            if !change.changed {
                debug!(action, route = %route.key(), "no status change needed");
                if route.most_recent_ingress() == Some(router) {
                    self.lease.extend(key);
                }
                return WorkOutcome::skipped();
            }

            if !change.created
                && self
                    .tracker
                    .is_change_contended(key, now, change.original.as_ref())
            {
                debug!(
                    action,
                    route = %route.key(),
                    "another writer is changing this ingress, skipping status update"
                );
                return WorkOutcome::failed(false);
            }

            match self.client.update_status(&route).await {
                Ok(_) => {
                    info!(
                        event = "status_written",
                        action,
                        route = %route.key(),
                        host = %change.latest.host,
                        "updated route status"
                    );
                    self.tracker.clear(key, &change.latest);
                    return WorkOutcome::succeeded();
                }
                Err(StatusError::Forbidden(_)) => {
                    warn!(
                        action,
                        route = %route.key(),
                        "unable to write route status, grant this router access to update route status"
                    );
                    return WorkOutcome::failed(false);
                }
                Err(StatusError::NotFound(_)) => {
                    debug!(action, route = %route.key(), "route deleted before status update");
                    return WorkOutcome::failed(false);
                }
                Err(StatusError::Conflict(_)) => {
                    debug!(action, route = %route.key(), "status update conflicted with another write");
                    return WorkOutcome::failed(true);
                }
                Err(err @ StatusError::Other(_)) => {
                    attempts -= 1;
                    warn!(action, route = %route.key(), error = %err, attempts, "status update failed");
                    if attempts == 0 {
                        return WorkOutcome::failed(true);
                    }
                }
            }
        }
    }
}

/// Records admission decisions in route status while forwarding every route
/// event downstream.
///
/// Writes go through a [`WriteLease`] keyed by route uid and are skipped
/// while the [`ContentionTracker`] reports another writer fighting over the
/// same ingress.
pub struct StatusAdmitter {
    next: Arc<dyn Plugin>,
    writer: Arc<StatusWriter>,
}

impl StatusAdmitter {
    pub fn new(
        next: Arc<dyn Plugin>,
        options: StatusOptions,
        client: Arc<dyn RouteStatusClient>,
        lister: Arc<dyn RouteLister>,
        tracker: Arc<dyn ContentionTracker>,
        lease: WriteLease,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            writer: Arc::new(StatusWriter {
                options,
                client,
                lister,
                tracker,
                lease,
                clock,
            }),
        }
    }

    pub fn writer(&self) -> &Arc<StatusWriter> {
        &self.writer
    }

    pub fn lease(&self) -> &WriteLease {
        &self.writer.lease
    }

    /// Schedules a write of `condition` unless the route already carries it
    /// or the ingress is contended.
    fn update_condition(&self, action: &'static str, route: &Route, condition: RouteIngressCondition) {
        let writer = &self.writer;
        let now = writer.clock.now();

        let mut preview = route.clone();
        let change = record_ingress_condition(
            &mut preview,
            &writer.options.router_name,
            &writer.options.canonical_hostname,
            &condition,
            now,
        );
        if !change.changed {
            debug!(action, route = %route.key(), "route status already up to date");
            return;
        }
        if !change.created
            && writer
                .tracker
                .is_change_contended(route.uid(), now, change.original.as_ref())
        {
            debug!(action, route = %route.key(), "status write skipped, ingress is contended");
            return;
        }

        let key = route.uid().to_string();
        let namespace = route.namespace().to_string();
        let name = route.name().to_string();
        let work_writer = writer.clone();
        let work_key = key.clone();
        let condition = Arc::new(condition);

        writer.lease.try_work(
            &key,
            work_fn(move || {
                let writer = work_writer.clone();
                let key = work_key.clone();
                let namespace = namespace.clone();
                let name = name.clone();
                let condition = condition.clone();
                async move {
                    writer
                        .perform_update(action, &key, &namespace, &name, &condition)
                        .await
                }
            }),
        );
    }
}

impl RejectionRecorder for StatusAdmitter {
    fn record_route_rejection(&self, route: &Route, reason: &str, message: &str) {
        self.update_condition("reject", route, RouteIngressCondition::rejected(reason, message));
    }
}

impl Plugin for StatusAdmitter {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        match event {
            EventType::Added | EventType::Modified => {
                self.update_condition("admit", route, RouteIngressCondition::admitted());
            }
            EventType::Deleted => {
                self.writer.lease.remove(route.uid());
            }
        }
        self.next.handle_route(event, route)
    }

    fn handle_endpoints(&self, event: EventType, endpoints: &Endpoints) -> Result<(), PluginError> {
        self.next.handle_endpoints(event, endpoints)
    }

    fn handle_node(&self, event: EventType, node: &Node) -> Result<(), PluginError> {
        self.next.handle_node(event, node)
    }

    fn handle_namespaces(&self, namespaces: &HashSet<String>) -> Result<(), PluginError> {
        self.next.handle_namespaces(namespaces)
    }

    fn commit(&self) -> Result<(), PluginError> {
        self.next.commit()
    }
}
