use crate::model::{Route, RouteKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) type Claimants = Arc<Vec<Arc<Route>>>;

#[derive(Debug)]
pub(crate) enum ClaimOutcome {
    /// The route holds the key. `displaced` lost it to the route.
    Admitted { displaced: Vec<Arc<Route>> },
    /// An older route holds the key.
    Rejected { owner: Arc<Route> },
}

/// Ownership of claim keys (hosts or subdomains) by routes.
///
/// Claimant lists are kept oldest first, so the owner of a key is always the
/// first element. Lists are never mutated in place; every change stores a new
/// list. Only one namespace holds a key at a time.
#[derive(Debug, Default)]
pub(crate) struct ClaimTable {
    claims: HashMap<String, Claimants>,
    by_route: HashMap<RouteKey, String>,
}

impl ClaimTable {
    /// Claims `key` for `route`.
    ///
    /// When `path_exclusive` is set, two routes of the owning namespace may
    /// not share a path; the strictly older one keeps it.
    pub(crate) fn claim(&mut self, key: &str, route: &Route, path_exclusive: bool) -> ClaimOutcome {
        let route_key = route.key();
        if self.by_route.get(&route_key).is_some_and(|old| old != key) {
            self.release(&route_key);
        }

        let current = self.claims.get(key).cloned().unwrap_or_default();
        let mut next: Vec<Arc<Route>> = current
            .iter()
            .filter(|r| r.key() != route_key)
            .cloned()
            .collect();
        let was_claimant = next.len() != current.len();
        let mut displaced = Vec::new();

        match next.first() {
            Some(oldest) if oldest.namespace() != route.namespace() => {
                if !route.is_older_than(oldest) {
                    let owner = oldest.clone();
                    self.reject(key, &route_key, next, was_claimant);
                    return ClaimOutcome::Rejected { owner };
                }
                displaced = std::mem::take(&mut next);
            }
            _ => {
                if path_exclusive
                    && let Some(pos) = next.iter().position(|r| r.spec.path == route.spec.path)
                {
                    if !route.is_older_than(&next[pos]) {
                        let owner = next[pos].clone();
                        self.reject(key, &route_key, next, was_claimant);
                        return ClaimOutcome::Rejected { owner };
                    }
                    displaced.push(next.remove(pos));
                }
            }
        }

        // newest last; equal timestamps keep arrival order
        let at = next
            .iter()
            .position(|r| route.is_older_than(r))
            .unwrap_or(next.len());
        next.insert(at, Arc::new(route.clone()));

        for d in &displaced {
            self.by_route.remove(&d.key());
        }
        self.claims.insert(key.to_string(), Arc::new(next));
        self.by_route.insert(route_key, key.to_string());

        ClaimOutcome::Admitted { displaced }
    }

    fn reject(&mut self, key: &str, route_key: &RouteKey, remaining: Vec<Arc<Route>>, was_claimant: bool) {
        if !was_claimant {
            return;
        }
        self.by_route.remove(route_key);
        if remaining.is_empty() {
            self.claims.remove(key);
        } else {
            self.claims.insert(key.to_string(), Arc::new(remaining));
        }
    }

    /// Drops whatever claim `route` holds. Returns the released key.
    pub(crate) fn release(&mut self, route: &RouteKey) -> Option<String> {
        let key = self.by_route.remove(route)?;
        if let Some(current) = self.claims.get(&key) {
            let next: Vec<Arc<Route>> = current
                .iter()
                .filter(|r| &r.key() != route)
                .cloned()
                .collect();
            if next.is_empty() {
                self.claims.remove(&key);
            } else {
                self.claims.insert(key.clone(), Arc::new(next));
            }
        }
        Some(key)
    }

    /// Removes every claim held by a route outside `namespaces`.
    pub(crate) fn retain_namespaces(&mut self, namespaces: &HashSet<String>) -> usize {
        let before = self.by_route.len();

        let mut next_claims = HashMap::with_capacity(self.claims.len());
        for (key, claimants) in self.claims.drain() {
            let kept: Vec<Arc<Route>> = claimants
                .iter()
                .filter(|r| namespaces.contains(r.namespace()))
                .cloned()
                .collect();
            if !kept.is_empty() {
                next_claims.insert(key, Arc::new(kept));
            }
        }
        self.claims = next_claims;

        let claims = &self.claims;
        self.by_route.retain(|route, key| {
            claims
                .get(key)
                .is_some_and(|list| list.iter().any(|r| &r.key() == route))
        });
        before - self.by_route.len()
    }

    pub(crate) fn claimants(&self, key: &str) -> Option<Claimants> {
        self.claims.get(key).cloned()
    }

    pub(crate) fn claimed_by(&self, route: &RouteKey) -> Option<&str> {
        self.by_route.get(route).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.claims.len()
    }
}
