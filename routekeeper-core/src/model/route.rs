use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human key of a route: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey(String);

impl RouteKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    /// Stable identity. A route deleted and recreated under the same name
    /// gets a new uid.
    #[serde(default)]
    pub uid: String,

    #[serde(default = "epoch")]
    pub creation_timestamp: DateTime<Utc>,

    /// Optimistic-concurrency token of the backing store.
    #[serde(default)]
    pub resource_version: u64,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WildcardPolicy {
    #[default]
    None,
    Subdomain,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub wildcard_policy: WildcardPolicy,

    #[serde(default)]
    pub to: BackendRef,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_backends: Vec<BackendRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Admitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngressCondition {
    #[serde(rename = "type")]
    pub kind: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl RouteIngressCondition {
    pub fn admitted() -> Self {
        Self {
            kind: ConditionType::Admitted,
            status: ConditionStatus::True,
            reason: String::new(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    pub fn rejected(reason: &str, message: &str) -> Self {
        Self {
            kind: ConditionType::Admitted,
            status: ConditionStatus::False,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: None,
        }
    }

    /// Equality that ignores the transition timestamp.
    pub fn same_state(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Status block written by one router identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default)]
    pub host: String,

    pub router_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub router_canonical_hostname: String,

    #[serde(default)]
    pub wildcard_policy: WildcardPolicy,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RouteIngressCondition>,
}

impl RouteIngress {
    pub fn condition(&self, kind: ConditionType) -> Option<&RouteIngressCondition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    /// Compares only the fields a router controls directly. Conditions are
    /// rewritten on every write by the same router and are left out.
    pub fn same_target(&self, other: &RouteIngress) -> bool {
        self.host == other.host
            && self.router_canonical_hostname == other.router_canonical_hostname
            && self.wildcard_policy == other.wildcard_policy
            && self.router_name == other.router_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(rename = "metadata")]
    pub meta: ObjectMeta,

    #[serde(default)]
    pub spec: RouteSpec,

    #[serde(default)]
    pub status: RouteStatus,
}

impl Route {
    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.meta.namespace, &self.meta.name)
    }

    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn uid(&self) -> &str {
        &self.meta.uid
    }

    /// Strictly earlier creation time. Equal timestamps are not older.
    pub fn is_older_than(&self, other: &Route) -> bool {
        self.meta.creation_timestamp < other.meta.creation_timestamp
    }

    pub fn ingress_for(&self, router_name: &str) -> Option<&RouteIngress> {
        self.status
            .ingress
            .iter()
            .find(|i| i.router_name == router_name)
    }

    /// Name of the router whose Admitted condition transitioned last.
    pub fn most_recent_ingress(&self) -> Option<&str> {
        let mut newest: Option<(&str, DateTime<Utc>)> = None;
        for ingress in &self.status.ingress {
            let Some(at) = ingress
                .condition(ConditionType::Admitted)
                .and_then(|c| c.last_transition_time)
            else {
                continue;
            };
            if newest.is_none_or(|(_, recent)| at > recent) {
                newest = Some((ingress.router_name.as_str(), at));
            }
        }
        newest.map(|(name, _)| name)
    }
}

/// Returns the domain a host belongs to: everything after the first label.
pub fn subdomain_of(host: &str) -> Option<&str> {
    host.split_once('.')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}
