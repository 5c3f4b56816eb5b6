//! Builders for JSON-lines watch events.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn route_event(event: &str, namespace: &str, name: &str, host: &str, age_secs: i64) -> String {
    route_event_with_path(event, namespace, name, host, "", age_secs)
}

/// A route created `age_secs` after [`base_time`].
pub fn route_event_with_path(
    event: &str,
    namespace: &str,
    name: &str,
    host: &str,
    path: &str,
    age_secs: i64,
) -> String {
    let created = base_time() + TimeDelta::seconds(age_secs);
    json!({
        "kind": "Route",
        "type": event,
        "object": {
            "metadata": {
                "namespace": namespace,
                "name": name,
                "uid": format!("{namespace}-{name}-uid"),
                "creationTimestamp": created.to_rfc3339(),
            },
            "spec": {
                "host": host,
                "path": path,
                "to": { "name": format!("{name}-svc") },
            },
        },
    })
    .to_string()
}

pub fn endpoints_event(event: &str, namespace: &str, service: &str, ips: &[&str]) -> String {
    json!({
        "kind": "Endpoints",
        "type": event,
        "object": {
            "namespace": namespace,
            "name": service,
            "subsets": [{
                "addresses": ips.iter().map(|ip| json!({ "ip": ip })).collect::<Vec<_>>(),
                "ports": [{ "name": "http", "port": 8080 }],
            }],
        },
    })
    .to_string()
}

pub fn namespaces_event(names: &[&str]) -> String {
    json!({ "kind": "Namespaces", "names": names }).to_string()
}

pub fn list_complete() -> String {
    json!({ "kind": "ListComplete" }).to_string()
}
