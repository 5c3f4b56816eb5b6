use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Pid file owned by this process. Removed on drop unless another process
/// has rewritten it since.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    pub fn create(path: &Path) -> Result<Self> {
        let pid = std::process::id();
        fs::write(path, format!("{pid}\n"))
            .with_context(|| format!("failed to write pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn still_ours(&self) -> bool {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|body| body.trim().parse::<u32>().ok())
            == Some(self.pid)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.still_ours() {
            let _ = fs::remove_file(&self.path);
        }
    }
}
