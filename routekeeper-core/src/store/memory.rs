use crate::model::{Route, RouteUpdate};
use crate::status::{RouteLister, RouteStatusClient, StatusError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// Buffered route updates per subscriber.
pub const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Shared route store standing in for the API server.
///
/// Every stored version gets a fresh `resource_version`; status writes
/// against an older version fail with [`StatusError::Conflict`]. Each stored
/// change is broadcast as a [`RouteUpdate`].
pub struct InMemoryRouteStore {
    routes: DashMap<String, Route>,
    updates: broadcast::Sender<RouteUpdate>,
    deny_writes: AtomicBool,
}

fn store_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Fills what a watch event may leave out from the stored copy.
fn carry_over(route: &mut Route, stored: Option<&Route>) {
    if route.status.ingress.is_empty()
        && let Some(stored) = stored
    {
        route.status = stored.status.clone();
    }
    if route.meta.uid.is_empty() {
        route.meta.uid = stored
            .map(|s| s.meta.uid.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
    }
    let next_version = stored.map_or(1, |s| s.meta.resource_version + 1);
    route.meta.resource_version = route.meta.resource_version.max(next_version);
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            routes: DashMap::new(),
            updates,
            deny_writes: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouteUpdate> {
        self.updates.subscribe()
    }

    /// Makes status writes fail with [`StatusError::Forbidden`].
    pub fn deny_status_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::Relaxed);
    }

    /// Stores `route` as observed from a watch, returning the stored copy.
    /// A route without a uid keeps the stored one or gets a new one, and one
    /// without status keeps the stored status.
    pub fn upsert(&self, mut route: Route) -> Route {
        let key = store_key(route.namespace(), route.name());
        let old = match self.routes.get_mut(&key) {
            Some(mut current) => {
                let old = current.value().clone();
                carry_over(&mut route, Some(&old));
                *current = route.clone();
                Some(old)
            }
            None => {
                carry_over(&mut route, None);
                self.routes.insert(key, route.clone());
                None
            }
        };

        self.publish(old, route.clone());
        route
    }

    pub fn delete(&self, namespace: &str, name: &str) -> Option<Route> {
        let removed = self.routes.remove(&store_key(namespace, name)).map(|(_, r)| r);
        if removed.is_some() {
            trace!(route = %store_key(namespace, name), "route removed from store");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn publish(&self, old: Option<Route>, new: Route) {
        // no subscribers is fine
        let _ = self.updates.send(RouteUpdate { old, new });
    }
}

impl Default for InMemoryRouteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteLister for InMemoryRouteStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Route, StatusError> {
        let key = store_key(namespace, name);
        self.routes
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or(StatusError::NotFound(key))
    }
}

#[async_trait]
impl RouteStatusClient for InMemoryRouteStore {
    async fn update_status(&self, route: &Route) -> Result<Route, StatusError> {
        let key = store_key(route.namespace(), route.name());
        if self.deny_writes.load(Ordering::Relaxed) {
            return Err(StatusError::Forbidden(key));
        }

        let (old, stored) = {
            let Some(mut current) = self.routes.get_mut(&key) else {
                return Err(StatusError::NotFound(key));
            };
            if current.uid() != route.uid()
                || current.meta.resource_version != route.meta.resource_version
            {
                debug!(
                    route = %key,
                    have = current.meta.resource_version,
                    given = route.meta.resource_version,
                    "stale status write"
                );
                return Err(StatusError::Conflict(key));
            }
            let old = current.value().clone();
            current.status = route.status.clone();
            current.meta.resource_version += 1;
            (old, current.value().clone())
        };

        self.publish(Some(old), stored.clone());
        Ok(stored)
    }
}
