use super::claims::{ClaimOutcome, ClaimTable};
use super::{
    Plugin, PluginError, REASON_ROUTE_NOT_ADMITTED, REASON_SUBDOMAIN_ALREADY_CLAIMED,
    RejectionRecorder,
};
use crate::model::{Endpoints, EventType, Node, Route, WildcardPolicy, subdomain_of};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Decides whether a route may be served at all, before any ownership
/// check. The error is the human readable rejection message.
pub type RouteAdmissionFn = Arc<dyn Fn(&Route) -> Result<(), String> + Send + Sync>;

/// Admits every route.
pub fn admit_all() -> RouteAdmissionFn {
    Arc::new(|_| Ok(()))
}

/// Rejects hosts under a denied domain and, when `allowed` is not empty,
/// hosts outside every allowed domain.
pub fn domain_admission(denied: Vec<String>, allowed: Vec<String>) -> RouteAdmissionFn {
    Arc::new(move |route: &Route| {
        let host = route.spec.host.to_ascii_lowercase();
        if host.is_empty() {
            return Ok(());
        }
        if let Some(domain) = denied.iter().find(|d| in_domain(&host, d)) {
            return Err(format!("host {host} is in denied domain {domain}"));
        }
        if !allowed.is_empty() && !allowed.iter().any(|d| in_domain(&host, d)) {
            return Err(format!("host {host} is not in an allowed domain"));
        }
        Ok(())
    })
}

fn in_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[derive(Debug, Clone, Default)]
pub struct HostAdmitterOptions {
    /// Give each subdomain to the routes of a single namespace.
    pub restrict_subdomain_ownership: bool,
    pub allow_wildcard_routes: bool,
}

/// First stage of the chain: admission checks and subdomain ownership.
pub struct HostAdmitter {
    next: Arc<dyn Plugin>,
    admitter: RouteAdmissionFn,
    recorder: Arc<dyn RejectionRecorder>,
    options: HostAdmitterOptions,
    claims: Mutex<ClaimTable>,
}

impl HostAdmitter {
    pub fn new(
        next: Arc<dyn Plugin>,
        admitter: RouteAdmissionFn,
        recorder: Arc<dyn RejectionRecorder>,
        options: HostAdmitterOptions,
    ) -> Self {
        Self {
            next,
            admitter,
            recorder,
            options,
            claims: Mutex::new(ClaimTable::default()),
        }
    }

    fn claims(&self) -> MutexGuard<'_, ClaimTable> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit(&self, route: &Route) -> Result<(), String> {
        (self.admitter)(route)?;
        if route.spec.wildcard_policy == WildcardPolicy::Subdomain && !self.options.allow_wildcard_routes {
            return Err("wildcard routes are not allowed".to_string());
        }
        Ok(())
    }

    /// Routes currently holding `subdomain`, oldest first.
    pub fn claimants(&self, subdomain: &str) -> Vec<Route> {
        self.claims()
            .claimants(subdomain)
            .map(|list| list.iter().map(|r| r.as_ref().clone()).collect())
            .unwrap_or_default()
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

    fn claim_subdomain(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        let Some(subdomain) = subdomain_of(&route.spec.host) else {
            // a host without a subdomain holds nothing, drop any earlier claim
            self.claims().release(&route.key());
            return Ok(());
        };

        let outcome = self.claims().claim(subdomain, route, false);
        match outcome {
            ClaimOutcome::Rejected { owner } => {
                let message = format!(
                    "a route in another namespace holds {subdomain} and is older than {}",
                    route.name()
                );
                info!(
                    event = "route_rejected",
                    route = %route.key(),
                    owner = %owner.key(),
                    subdomain,
                    reason = REASON_SUBDOMAIN_ALREADY_CLAIMED,
                    "subdomain already claimed"
                );
                self.withdraw(event, route);
                self.recorder
                    .record_route_rejection(route, REASON_SUBDOMAIN_ALREADY_CLAIMED, &message);
                Err(PluginError::rejected(
                    route.key(),
                    REASON_SUBDOMAIN_ALREADY_CLAIMED,
                    message,
                ))
            }
            ClaimOutcome::Admitted { displaced } => {
                for old in displaced {
                    let message = format!(
                        "a route in another namespace holds {subdomain} and is older than {}",
                        old.name()
                    );
                    info!(
                        event = "route_displaced",
                        route = %old.key(),
                        owner = %route.key(),
                        subdomain,
                        "older route reclaimed subdomain"
                    );
                    if let Err(err) = self.next.handle_route(EventType::Deleted, &old) {
                        debug!(route = %old.key(), error = %err, "removing displaced route failed");
                    }
                    self.recorder
                        .record_route_rejection(&old, REASON_SUBDOMAIN_ALREADY_CLAIMED, &message);
                }
                Ok(())
            }
        }
    }
}

impl Plugin for HostAdmitter {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        match event {
            EventType::Added | EventType::Modified => {
                if let Err(message) = self.admit(route) {
                    debug!(route = %route.key(), message, "route not admitted");
                    self.claims().release(&route.key());
                    self.withdraw(event, route);
                    self.recorder
                        .record_route_rejection(route, REASON_ROUTE_NOT_ADMITTED, &message);
                    return Err(PluginError::not_admitted(route.key(), message));
                }
                if self.options.restrict_subdomain_ownership {
                    self.claim_subdomain(event, route)?;
                }
            }
            EventType::Deleted => {
                if self.options.restrict_subdomain_ownership {
                    self.claims().release(&route.key());
                }
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
        let purged = self.claims().retain_namespaces(namespaces);
        if purged > 0 {
            debug!(purged, "released subdomain claims of removed namespaces");
        }
        self.next.handle_namespaces(namespaces)
    }

    fn commit(&self) -> Result<(), PluginError> {
        self.next.commit()
    }
}
