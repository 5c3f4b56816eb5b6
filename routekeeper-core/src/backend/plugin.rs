use super::{BackendReloader, RouterState, ServiceAliasConfig, read_state};
use crate::model::{Endpoints, EventType, Node, Route};
use crate::plugin::{Plugin, PluginError};
use crate::reload::{ReloadCoalescer, ReloadIntervals};
use anyhow::Context;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub state_dir: PathBuf,
    pub reload_script: Option<PathBuf>,
    pub intervals: ReloadIntervals,
}

/// Terminal stage of the chain: keeps the load balancer state and asks for
/// reloads when it changes.
pub struct BackendPlugin {
    state: Arc<Mutex<RouterState>>,
    coalescer: ReloadCoalescer,
}

impl BackendPlugin {
    /// Loads persisted state and performs the start-up reload right away so
    /// health checks are answered before the first sync.
    ///
    /// The coalescer is returned unstarted; the caller spawns it.
    pub async fn start(options: BackendOptions) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&options.state_dir)
            .await
            .with_context(|| {
                format!("failed to create state dir {}", options.state_dir.display())
            })?;
        let dir = options.state_dir.clone();
        let aliases = tokio::task::spawn_blocking(move || read_state(&dir))
            .await
            .context("state reader task failed")??;
        info!(
            state_dir = %options.state_dir.display(),
            aliases = aliases.len(),
            "loaded router state"
        );

        let state = Arc::new(Mutex::new(RouterState::from_aliases(aliases)));
        let reloader = BackendReloader::new(state.clone(), options.state_dir, options.reload_script);
        let coalescer = ReloadCoalescer::new(Arc::new(reloader), options.intervals);
        coalescer
            .commit_now()
            .await
            .context("initial backend reload failed")?;

        Ok(Self { state, coalescer })
    }

    pub fn coalescer(&self) -> &ReloadCoalescer {
        &self.coalescer
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn aliases(&self) -> BTreeMap<String, ServiceAliasConfig> {
        self.state().aliases.clone()
    }

    pub fn is_synced(&self) -> bool {
        self.state().synced
    }

    pub fn endpoint_count(&self, unit: &str) -> usize {
        self.state()
            .service_units
            .get(unit)
            .map_or(0, |u| u.endpoint_table.len())
    }
}

impl Plugin for BackendPlugin {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError> {
        let mut state = self.state();
        let changed = match event {
            EventType::Added | EventType::Modified => state.add_route(route),
            EventType::Deleted => state.remove_route(route),
        };
        if changed {
            debug!(route = %route.key(), %event, host = %route.spec.host, "backend route updated");
        }
        Ok(())
    }

    fn handle_endpoints(&self, event: EventType, endpoints: &Endpoints) -> Result<(), PluginError> {
        let mut state = self.state();
        let changed = match event {
            EventType::Added | EventType::Modified => state.set_endpoints(endpoints),
            EventType::Deleted => state.clear_endpoints(endpoints),
        };
        if changed {
            debug!(service = %endpoints.key(), %event, "backend endpoints updated");
        }
        Ok(())
    }

    fn handle_node(&self, event: EventType, node: &Node) -> Result<(), PluginError> {
        debug!(node = %node.name, %event, "node event ignored by backend");
        Ok(())
    }

    fn handle_namespaces(&self, namespaces: &HashSet<String>) -> Result<(), PluginError> {
        let removed = self.state().filter_namespaces(namespaces);
        if removed > 0 {
            info!(removed, namespaces = namespaces.len(), "dropped backend state of removed namespaces");
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), PluginError> {
        let mut state = self.state();
        if !state.synced {
            state.synced = true;
            state.state_changed = true;
            self.coalescer.mark_synced();
            info!(event = "synced", "router state synced, first full reload requested");
        }
        if state.state_changed {
            self.coalescer.invoke();
        }
        Ok(())
    }
}
