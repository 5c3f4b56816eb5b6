use super::claims::{ClaimOutcome, ClaimTable};
use super::{
    Plugin, PluginError, REASON_HOST_ALREADY_CLAIMED, REASON_NO_HOST_VALUE, RejectionRecorder,
};
use crate::model::{Endpoints, EventType, Node, Route};
use arc_swap::ArcSwapOption;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Builds a host for routes that do not name one.
#[derive(Debug, Clone, Default)]
pub struct HostnameGenerator {
    suffix: Option<String>,
}

impl HostnameGenerator {
    pub fn new(suffix: Option<String>) -> Self {
        let suffix = suffix
            .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty());
        Self { suffix }
    }

    /// `<name>-<namespace>.<suffix>`, or `None` without a suffix.
    pub fn generate(&self, route: &Route) -> Option<String> {
        let suffix = self.suffix.as_ref()?;
        Some(format!("{}-{}.{}", route.name(), route.namespace(), suffix))
    }
}

/// Gives each host to one route, or to several routes of one namespace as
/// long as their paths differ.
pub struct UniqueHost {
    next: Arc<dyn Plugin>,
    recorder: Arc<dyn RejectionRecorder>,
    hostnames: HostnameGenerator,
    namespaces: ArcSwapOption<HashSet<String>>,
    claims: Mutex<ClaimTable>,
}

impl UniqueHost {
    pub fn new(
        next: Arc<dyn Plugin>,
        recorder: Arc<dyn RejectionRecorder>,
        hostnames: HostnameGenerator,
    ) -> Self {
        Self {
            next,
            recorder,
            hostnames,
            namespaces: ArcSwapOption::empty(),
            claims: Mutex::new(ClaimTable::default()),
        }
    }

    fn claims(&self) -> MutexGuard<'_, ClaimTable> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allows_namespace(&self, namespace: &str) -> bool {
        self.namespaces
            .load()
            .as_ref()
            .is_none_or(|allowed| allowed.contains(namespace))
    }

    /// Routes currently exposing `host`, oldest first.
    pub fn claimants(&self, host: &str) -> Vec<Route> {
        self.claims()
            .claimants(host)
            .map(|list| list.iter().map(|r| r.as_ref().clone()).collect())
            .unwrap_or_default()
    }

    /// Host currently held by the route `namespace/name`.
    pub fn host_of(&self, route: &Route) -> Option<String> {
        self.claims().claimed_by(&route.key()).map(str::to_string)
    }

    pub fn hosts(&self) -> usize {
        self.claims().len()
    }

    /// Takes a route that was served before out of the rest of the chain.
    /// Runs ahead of the rejection record, which a removal would cancel.
    fn withdraw(&self, event: EventType, route: &Route) {
        if event != EventType::Modified {
            return;
        }
        if let Err(err) = self.next.handle_route(EventType::Deleted, route) {
            debug!(route = %route.key(), error = %err, "withdrawing rejected route failed");
        }
    }

    fn claim_host(&self, event: EventType, host: &str, route: &Route) -> Result<(), PluginError> {
        let outcome = self.claims().claim(host, route, true);
        match outcome {
            ClaimOutcome::Rejected { owner } => {
                let message = format!("route {} already exposes {host} and is older", owner.name());
                info!(
                    event = "route_rejected",
                    route = %route.key(),
                    owner = %owner.key(),
                    host,
                    reason = REASON_HOST_ALREADY_CLAIMED,
                    "host already claimed"
                );
                self.withdraw(event, route);
                self.recorder
                    .record_route_rejection(route, REASON_HOST_ALREADY_CLAIMED, &message);
                Err(PluginError::rejected(route.key(), REASON_HOST_ALREADY_CLAIMED, message))
            }
            ClaimOutcome::Admitted { displaced } => {
                for old in displaced {
                    let message = format!("replaced by older route {}", route.name());
                    info!(
                        event = "route_displaced",
                        route = %old.key(),
                        owner = %route.key(),
                        host,
                        "older route reclaimed host"
                    );
                    // Removal drops the lease key, so it goes before the
                    // rejection write is scheduled.
                    if let Err(err) = self.next.handle_route(EventType::Deleted, &old) {
                        debug!(route = %old.key(), error = %err, "removing displaced route failed");
                    }
                    self.recorder
                        .record_route_rejection(&old, REASON_HOST_ALREADY_CLAIMED, &message);
                }
                Ok(())
            }
        }
    }
}

impl Plugin for UniqueHost {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        if !self.allows_namespace(route.namespace()) {
            debug!(route = %route.key(), "namespace not served, ignoring route");
            return Ok(());
        }

        let route: Cow<'_, Route> = if route.spec.host.is_empty() {
            let Some(host) = self.hostnames.generate(route) else {
                if event == EventType::Deleted {
                    self.claims().release(&route.key());
                    return self.next.handle_route(event, route);
                }
                debug!(route = %route.key(), "route has no host value");
                self.claims().release(&route.key());
                self.withdraw(event, route);
                self.recorder.record_route_rejection(
                    route,
                    REASON_NO_HOST_VALUE,
                    "no host value was defined for the route",
                );
                return Err(PluginError::rejected(
                    route.key(),
                    REASON_NO_HOST_VALUE,
                    "no host value was defined for the route",
                ));
            };
            let mut generated = route.clone();
            generated.spec.host = host;
            Cow::Owned(generated)
        } else {
            Cow::Borrowed(route)
        };

        match event {
            EventType::Added | EventType::Modified => {
                self.claim_host(event, &route.spec.host, &route)?;
            }
            EventType::Deleted => {
                self.claims().release(&route.key());
            }
        }

        self.next.handle_route(event, &route)
    }

    fn handle_endpoints(&self, event: EventType, endpoints: &Endpoints) -> Result<(), PluginError> {
        self.next.handle_endpoints(event, endpoints)
    }

    fn handle_node(&self, event: EventType, node: &Node) -> Result<(), PluginError> {
        self.next.handle_node(event, node)
    }

    fn handle_namespaces(&self, namespaces: &HashSet<String>) -> Result<(), PluginError> {
        let purged = self.claims().retain_namespaces(namespaces);
        self.namespaces.store(Some(Arc::new(namespaces.clone())));
        if purged > 0 {
            debug!(purged, "released host claims of removed namespaces");
        }
        self.next.handle_namespaces(namespaces)
    }

    fn commit(&self) -> Result<(), PluginError> {
        self.next.commit()
    }
}
