use super::{RouterState, ServiceAliasConfig, state_path};
use crate::reload::ReloadTarget;
use anyhow::{Context, bail};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, info};

/// Persists router state and runs the reload script.
pub struct BackendReloader {
    state: Arc<Mutex<RouterState>>,
    state_dir: PathBuf,
    reload_script: Option<PathBuf>,
}

impl BackendReloader {
    pub fn new(
        state: Arc<Mutex<RouterState>>,
        state_dir: PathBuf,
        reload_script: Option<PathBuf>,
    ) -> Self {
        Self {
            state,
            state_dir,
            reload_script,
        }
    }
}

#[async_trait]
impl ReloadTarget for BackendReloader {
    async fn reload(&self) -> anyhow::Result<()> {
        let state = self.state.clone();
        let path = state_path(&self.state_dir);
        tokio::task::spawn_blocking(move || write_state(&state, &path))
            .await
            .context("state writer task failed")??;

        // never under the state lock
        if let Some(script) = &self.reload_script {
            run_reload_script(script).await?;
        }
        Ok(())
    }
}

/// Writes the alias map under the state lock and clears `state_changed`.
pub fn write_state(state: &Mutex<RouterState>, path: &Path) -> anyhow::Result<()> {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    state.state_changed = false;

    let json = serde_json::to_vec_pretty(&state.aliases).context("failed to encode router state")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write router state to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move router state into {}", path.display()))?;

    debug!(path = %path.display(), aliases = state.aliases.len(), "router state written");
    Ok(())
}

/// Reads the persisted alias map. A missing file is an empty state.
pub fn read_state(state_dir: &Path) -> anyhow::Result<BTreeMap<String, ServiceAliasConfig>> {
    let path = state_path(state_dir);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read router state {}", path.display()));
        }
    };
    serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse router state {}", path.display()))
}

async fn run_reload_script(script: &Path) -> anyhow::Result<()> {
    let output = Command::new(script)
        .output()
        .await
        .with_context(|| format!("failed to run reload script {}", script.display()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        bail!(
            "reload script {} exited with {}: {}",
            script.display(),
            output.status,
            combined.trim()
        );
    }

    info!(script = %script.display(), output = combined.trim(), "reload script finished");
    Ok(())
}
