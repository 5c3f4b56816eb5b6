use crate::model::{Endpoints, Route, WildcardPolicy};
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "routes.json";

/// Default weight of a backend that does not set one.
const DEFAULT_WEIGHT: u32 = 100;

/// One backend address of a service unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub ip: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

/// A service and its current endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUnit {
    pub name: String,
    pub endpoint_table: Vec<Endpoint>,
}

/// Load balancer view of one admitted route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAliasConfig {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub path: String,
    pub is_wildcard: bool,
    /// Service unit key (`namespace/service`) to weight.
    pub service_unit_names: BTreeMap<String, u32>,
    /// Units with a non-zero weight.
    pub active_service_units: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_port: Option<String>,
    /// Stable hash of the alias key, usable as a cookie or backend name.
    pub routing_key_name: String,
}

impl ServiceAliasConfig {
    pub fn from_route(route: &Route) -> Self {
        let namespace = route.namespace();
        let mut service_unit_names = BTreeMap::new();
        for backend in std::iter::once(&route.spec.to).chain(route.spec.alternate_backends.iter()) {
            if backend.name.is_empty() {
                continue;
            }
            service_unit_names.insert(
                format!("{namespace}/{}", backend.name),
                backend.weight.unwrap_or(DEFAULT_WEIGHT),
            );
        }
        let active_service_units = service_unit_names.values().filter(|w| **w > 0).count();

        Self {
            name: route.name().to_string(),
            namespace: namespace.to_string(),
            host: route.spec.host.clone(),
            path: route.spec.path.clone(),
            is_wildcard: route.spec.wildcard_policy == WildcardPolicy::Subdomain,
            service_unit_names,
            active_service_units,
            prefer_port: route.spec.target_port.clone(),
            routing_key_name: routing_key_name(&alias_key(route)),
        }
    }
}

/// State map key of a route: `namespace:name`.
pub fn alias_key(route: &Route) -> String {
    format!("{}:{}", route.namespace(), route.name())
}

// Fixed-seed ahash:
// - stable across restarts, so persisted names stay valid
// - not used for security
pub fn routing_key_name(key: &str) -> String {
    static HASHER: RandomState = RandomState::with_seeds(1, 2, 3, 4);

    format!("{:016x}", HASHER.hash_one(key))
}

/// Everything the backend configuration is rendered from.
#[derive(Debug, Default)]
pub struct RouterState {
    pub aliases: BTreeMap<String, ServiceAliasConfig>,
    pub service_units: BTreeMap<String, ServiceUnit>,
    /// Set by any mutation, cleared when the state is written out.
    pub state_changed: bool,
    /// Whether the initial lists have been processed.
    pub synced: bool,
}

impl RouterState {
    pub fn from_aliases(aliases: BTreeMap<String, ServiceAliasConfig>) -> Self {
        Self {
            aliases,
            ..Default::default()
        }
    }

    pub fn add_route(&mut self, route: &Route) -> bool {
        let config = ServiceAliasConfig::from_route(route);
        for unit in config.service_unit_names.keys() {
            self.service_units
                .entry(unit.clone())
                .or_insert_with(|| ServiceUnit {
                    name: unit.clone(),
                    endpoint_table: Vec::new(),
                });
        }

        let key = alias_key(route);
        if self.aliases.get(&key) == Some(&config) {
            return false;
        }
        self.aliases.insert(key, config);
        self.state_changed = true;
        true
    }

    pub fn remove_route(&mut self, route: &Route) -> bool {
        let removed = self.aliases.remove(&alias_key(route)).is_some();
        self.state_changed |= removed;
        removed
    }

    pub fn set_endpoints(&mut self, endpoints: &Endpoints) -> bool {
        let key = endpoints.key();
        let mut table = Vec::new();
        for subset in &endpoints.subsets {
            for address in &subset.addresses {
                for port in &subset.ports {
                    table.push(Endpoint {
                        id: format!("{}:{}", address.ip, port.port),
                        ip: address.ip.clone(),
                        port: port.port,
                        target_name: address.target_name.clone(),
                    });
                }
            }
        }

        let unit = self
            .service_units
            .entry(key.clone())
            .or_insert_with(|| ServiceUnit {
                name: key,
                endpoint_table: Vec::new(),
            });
        if unit.endpoint_table == table {
            return false;
        }
        unit.endpoint_table = table;
        self.state_changed = true;
        true
    }

    pub fn clear_endpoints(&mut self, endpoints: &Endpoints) -> bool {
        let Some(unit) = self.service_units.get_mut(&endpoints.key()) else {
            return false;
        };
        if unit.endpoint_table.is_empty() {
            return false;
        }
        unit.endpoint_table.clear();
        self.state_changed = true;
        true
    }

    /// Drops aliases and service units outside `namespaces`.
    pub fn filter_namespaces(&mut self, namespaces: &HashSet<String>) -> usize {
        let before = self.aliases.len() + self.service_units.len();
        self.aliases
            .retain(|_, alias| namespaces.contains(&alias.namespace));
        self.service_units.retain(|key, _| {
            key.split_once('/')
                .is_some_and(|(ns, _)| namespaces.contains(ns))
        });
        let removed = before - self.aliases.len() - self.service_units.len();
        if removed > 0 {
            self.state_changed = true;
        }
        removed
    }
}

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}
