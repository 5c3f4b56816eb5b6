use owo_colors::OwoColorize;
use routekeeper_core::conf::{RouterConfig, load_config};
use std::path::Path;

/// Prints a summary of the config at `path`. Returns false when it does not
/// load.
pub fn check(path: &Path, plain: bool) -> bool {
    match load_config(path) {
        Ok(cfg) => {
            for line in summary(&cfg) {
                if plain {
                    println!("✔ {line}");
                } else {
                    println!("{} {line}", "✔".green());
                }
            }
            true
        }
        Err(e) => {
            if plain {
                eprintln!("✘ {e}");
            } else {
                eprintln!("{} {}", "✘".red(), e.to_string().red());
            }
            false
        }
    }
}

fn summary(cfg: &RouterConfig) -> Vec<String> {
    let mut lines = vec![
        "Config loaded successfully".to_string(),
        format!("router name {}", cfg.router.name),
    ];
    if let Some(hostname) = &cfg.router.canonical_hostname {
        lines.push(format!("canonical hostname {hostname}"));
    }
    lines.push(format!("state dir {}", cfg.router.state_dir.display()));
    lines.push(format!(
        "subdomain ownership {}",
        if cfg.admission.restrict_subdomain_ownership {
            "restricted"
        } else {
            "shared"
        }
    ));
    lines.push(format!(
        "{} denied, {} allowed domains",
        cfg.admission.denied_domains.len(),
        cfg.admission.allowed_domains.len()
    ));
    match &cfg.admission.namespaces {
        Some(namespaces) => lines.push(format!("{} namespaces served", namespaces.len())),
        None => lines.push("all namespaces served".to_string()),
    }
    if cfg.status.enabled {
        lines.push(format!(
            "status writes enabled, contention window {}s, max {} contentions",
            cfg.status.contention_interval_seconds, cfg.status.max_contentions
        ));
    } else {
        lines.push("status writes disabled".to_string());
    }
    lines.push(format!(
        "reload interval {}ms, gap {}ms, settle {}ms",
        cfg.reload.interval_ms, cfg.reload.gap_ms, cfg.reload.event_wait_ms
    ));
    lines
}
