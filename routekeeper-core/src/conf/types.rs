use crate::backend::BackendOptions;
use crate::contention::ContentionParams;
use crate::lease::{Backoff, LeaseParams};
use crate::plugin::{HostAdmitterOptions, HostnameGenerator, RouteAdmissionFn, domain_admission};
use crate::reload::ReloadIntervals;
use crate::status::StatusOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFLICT_MESSAGE: &str = "another process is writing conflicting route status \
under a different router name; route status is not updated while conflicts are detected, \
check that every router is configured consistently";

/// Root of `routekeeper.hcl`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub router: RouterSection,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub reload: ReloadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterSection {
    /// Identity written into route status. `ROUTER_NAME` overrides it.
    #[serde(default)]
    pub name: String,

    /// `ROUTER_CANONICAL_HOSTNAME` overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_hostname: Option<String>,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Run after the state file is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_script: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/routekeeper")
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            canonical_hostname: None,
            state_dir: default_state_dir(),
            reload_script: None,
            pid_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_true")]
    pub restrict_subdomain_ownership: bool,

    #[serde(default)]
    pub allow_wildcard_routes: bool,

    #[serde(default)]
    pub denied_domains: Vec<String>,

    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Static namespace allow-list. Unset serves every namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,

    /// Suffix for hosts generated for routes without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_suffix: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            restrict_subdomain_ownership: true,
            allow_wildcard_routes: false,
            denied_domains: Vec::new(),
            allowed_domains: Vec::new(),
            namespaces: None,
            hostname_suffix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_contention_interval")]
    pub contention_interval_seconds: u64,

    #[serde(default = "default_max_contentions")]
    pub max_contentions: usize,

    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u64,

    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_conflict_message")]
    pub conflict_message: String,
}

fn default_contention_interval() -> u64 {
    60
}

fn default_max_contentions() -> usize {
    5
}

fn default_lease_duration() -> u64 {
    60
}

fn default_retry_interval() -> u64 {
    1000
}

fn default_conflict_message() -> String {
    DEFAULT_CONFLICT_MESSAGE.to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contention_interval_seconds: default_contention_interval(),
            max_contentions: default_max_contentions(),
            lease_duration_seconds: default_lease_duration(),
            retry_interval_ms: default_retry_interval(),
            conflict_message: default_conflict_message(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReloadConfig {
    #[serde(default = "default_reload_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_reload_gap")]
    pub gap_ms: u64,

    #[serde(default = "default_event_wait")]
    pub event_wait_ms: u64,
}

fn default_reload_interval() -> u64 {
    5000
}

fn default_reload_gap() -> u64 {
    1000
}

fn default_event_wait() -> u64 {
    100
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_reload_interval(),
            gap_ms: default_reload_gap(),
            event_wait_ms: default_event_wait(),
        }
    }
}

impl RouterConfig {
    pub fn status_options(&self) -> StatusOptions {
        StatusOptions {
            router_name: self.router.name.clone(),
            canonical_hostname: self.router.canonical_hostname.clone().unwrap_or_default(),
        }
    }

    pub fn contention_params(&self) -> ContentionParams {
        ContentionParams {
            expires: Duration::from_secs(self.status.contention_interval_seconds),
            max_contentions: self.status.max_contentions,
            message: self.status.conflict_message.clone(),
        }
    }

    pub fn lease_params(&self) -> LeaseParams {
        LeaseParams {
            lease_duration: Duration::from_secs(self.status.lease_duration_seconds),
            retry_interval: Duration::from_millis(self.status.retry_interval_ms),
            backoff: Backoff::default(),
        }
    }

    pub fn reload_intervals(&self) -> ReloadIntervals {
        ReloadIntervals {
            interval: Duration::from_millis(self.reload.interval_ms),
            gap: Duration::from_millis(self.reload.gap_ms),
            event_wait: Duration::from_millis(self.reload.event_wait_ms),
        }
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            state_dir: self.router.state_dir.clone(),
            reload_script: self.router.reload_script.clone(),
            intervals: self.reload_intervals(),
        }
    }

    pub fn host_admitter_options(&self) -> HostAdmitterOptions {
        HostAdmitterOptions {
            restrict_subdomain_ownership: self.admission.restrict_subdomain_ownership,
            allow_wildcard_routes: self.admission.allow_wildcard_routes,
        }
    }

    pub fn admission_fn(&self) -> RouteAdmissionFn {
        domain_admission(
            self.admission.denied_domains.clone(),
            self.admission.allowed_domains.clone(),
        )
    }

    pub fn hostname_generator(&self) -> HostnameGenerator {
        HostnameGenerator::new(self.admission.hostname_suffix.clone())
    }

    pub fn namespaces(&self) -> Option<HashSet<String>> {
        self.admission
            .namespaces
            .as_ref()
            .map(|names| names.iter().cloned().collect())
    }
}
