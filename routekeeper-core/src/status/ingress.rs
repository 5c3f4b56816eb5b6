use crate::model::{ConditionType, Route, RouteIngress, RouteIngressCondition};
use chrono::{DateTime, Utc};

/// Result of stamping a condition onto a route's ingress for one router.
#[derive(Debug, Clone)]
pub struct IngressChange {
    pub changed: bool,
    /// The router had no ingress entry before.
    pub created: bool,
    /// Transition time written, when changed.
    pub at: Option<DateTime<Utc>>,
    /// The router's ingress after the change.
    pub latest: RouteIngress,
    /// The router's ingress before the change, without conditions.
    pub original: Option<RouteIngress>,
}

/// Makes `route` carry `condition` in this router's ingress entry.
///
/// Duplicate entries for the router are collapsed, keeping the first. The
/// condition's transition time is only reset when something changed.
pub fn record_ingress_condition(
    route: &mut Route,
    router_name: &str,
    canonical_hostname: &str,
    condition: &RouteIngressCondition,
    now: DateTime<Utc>,
) -> IngressChange {
    let collapsed = collapse_duplicate_ingress(route, router_name);

    let host = route.spec.host.clone();
    let wildcard_policy = route.spec.wildcard_policy;

    let Some(existing) = route
        .status
        .ingress
        .iter_mut()
        .find(|i| i.router_name == router_name)
    else {
        let mut stamped = condition.clone();
        stamped.last_transition_time = Some(now);
        let ingress = RouteIngress {
            host,
            router_name: router_name.to_string(),
            router_canonical_hostname: canonical_hostname.to_string(),
            wildcard_policy,
            conditions: vec![stamped],
        };
        route.status.ingress.push(ingress.clone());
        return IngressChange {
            changed: true,
            created: true,
            at: Some(now),
            latest: ingress,
            original: None,
        };
    };

    let current = existing.condition(condition.kind);
    let changed = collapsed
        || existing.host != host
        || existing.wildcard_policy != wildcard_policy
        || existing.router_canonical_hostname != canonical_hostname
        || current.is_none_or(|c| !c.same_state(condition));

    if !changed {
        return IngressChange {
            changed: false,
            created: false,
            at: None,
            latest: existing.clone(),
            original: Some(existing.clone()),
        };
    }

    let mut original = existing.clone();
    original.conditions.clear();

    existing.host = host;
    existing.wildcard_policy = wildcard_policy;
    existing.router_canonical_hostname = canonical_hostname.to_string();

    let mut stamped = condition.clone();
    stamped.last_transition_time = Some(now);
    match existing.conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(slot) => *slot = stamped,
        None => existing.conditions.push(stamped),
    }

    IngressChange {
        changed: true,
        created: false,
        at: Some(now),
        latest: existing.clone(),
        original: Some(original),
    }
}

/// Drops every ingress entry for `router_name` after the first one.
/// Returns whether anything was removed.
pub fn collapse_duplicate_ingress(route: &mut Route, router_name: &str) -> bool {
    let before = route.status.ingress.len();
    let mut seen = false;
    route.status.ingress.retain(|i| {
        if i.router_name != router_name {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });
    route.status.ingress.len() != before
}

/// Whether `route` already shows this router's Admitted condition.
pub fn is_admitted_by(route: &Route, router_name: &str) -> bool {
    route
        .ingress_for(router_name)
        .and_then(|i| i.condition(ConditionType::Admitted))
        .is_some_and(|c| c.status == crate::model::ConditionStatus::True)
}
