use tracing_subscriber::{EnvFilter, fmt};

/// Install the JSON subscriber.
///
/// Filtering comes from `RUST_LOG` and defaults to `info`. Event fields are
/// flattened so `route`, `uid` and `host` land at the top level of each line.
pub fn init_normal_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .init();
}

pub fn init_logging() {
    // tokio-console owns the global subscriber when enabled
    if std::env::var("TOKIO_CONSOLE").is_ok() {
        console_subscriber::init();
    } else {
        init_normal_logging();
    }
}
