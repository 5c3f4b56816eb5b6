use super::ConfigError;
use super::normalize::{normalize, validate};
use super::types::RouterConfig;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "routekeeper.hcl";

pub const ENV_ROUTER_NAME: &str = "ROUTER_NAME";
pub const ENV_CANONICAL_HOSTNAME: &str = "ROUTER_CANONICAL_HOSTNAME";

/// Loads the config file, applying overrides from the process environment.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

pub fn load_config_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RouterConfig, ConfigError> {
    let source = fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    parse_config(&source, path, env)
}

/// Parses, overrides, normalizes and validates. `path` is only used in
/// errors.
pub fn parse_config(
    source: &str,
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RouterConfig, ConfigError> {
    let mut config: RouterConfig = hcl::from_str(source).map_err(|e| ConfigError::parse(path, e))?;

    if let Some(name) = env(ENV_ROUTER_NAME).filter(|v| !v.is_empty()) {
        config.router.name = name;
    }
    if let Some(hostname) = env(ENV_CANONICAL_HOSTNAME).filter(|v| !v.is_empty()) {
        config.router.canonical_hostname = Some(hostname);
    }

    normalize(&mut config);
    validate(&config)?;
    Ok(config)
}
