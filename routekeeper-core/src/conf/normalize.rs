use super::ConfigError;
use super::types::RouterConfig;

fn normalize_domains(domains: &mut Vec<String>) {
    for domain in domains.iter_mut() {
        *domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    }
    domains.retain(|d| !d.is_empty());
    domains.dedup();
}

/// Cleans up values that have a canonical form.
pub(crate) fn normalize(config: &mut RouterConfig) {
    config.router.name = config.router.name.trim().to_string();
    config.router.canonical_hostname = config
        .router
        .canonical_hostname
        .take()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty());

    normalize_domains(&mut config.admission.denied_domains);
    normalize_domains(&mut config.admission.allowed_domains);

    if let Some(namespaces) = &mut config.admission.namespaces {
        namespaces.retain(|ns| !ns.trim().is_empty());
    }
}

pub(crate) fn validate(config: &RouterConfig) -> Result<(), ConfigError> {
    if config.router.name.is_empty() {
        return Err(ConfigError::invalid(
            "router.name",
            "a router name is required (set it in the file or ROUTER_NAME)",
        ));
    }
    if config.router.state_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid("router.state_dir", "must not be empty"));
    }
    if let Some(domain) = config
        .admission
        .denied_domains
        .iter()
        .find(|d| config.admission.allowed_domains.contains(d))
    {
        return Err(ConfigError::invalid(
            "admission.allowed_domains",
            format!("{domain} is both allowed and denied"),
        ));
    }
    if config.status.enabled && config.status.lease_duration_seconds == 0 {
        return Err(ConfigError::invalid(
            "status.lease_duration_seconds",
            "must be greater than zero",
        ));
    }
    Ok(())
}
