mod pid;

use anyhow::{Context, Result};
use routekeeper_core::clock;
use routekeeper_core::conf::load_config;
use routekeeper_core::queue::EventQueues;
use routekeeper_core::runtime::RouterRuntime;
use routekeeper_core::source::JsonLinesSource;
use routekeeper_core::store::InMemoryRouteStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};

/// Time given to queued status writes when the event stream ends.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

type EventReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Load the config and run the router until end of input or Ctrl-C.
pub fn run(config_path: &Path, events: &str) -> Result<()> {
    let config = load_config(config_path)?;

    // Best-effort: a router without a pid file still serves
    let _pid_file = match &config.router.pid_file {
        Some(path) => match pid::PidFile::create(path) {
            Ok(pid_file) => {
                tracing::info!(pid_file = %pid_file.path().display(), "pid file written");
                Some(pid_file)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write pid file; continuing");
                None
            }
        },
        None => None,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = rt.block_on(async move {
        let reader = open_events(events).await?;
        let store = Arc::new(InMemoryRouteStore::new());
        let (mut runtime, sink) =
            RouterRuntime::start(config, store, EventQueues::new(), clock::system()).await?;

        let shutdown = runtime.shutdown_handle();
        let source = tokio::spawn(JsonLinesSource::new(reader, sink).run(runtime.shutdown_signal()));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                shutdown.trigger();
            }
            _ = runtime.wait_controller() => {
                tracing::info!("event stream drained");
            }
        }

        match source.await {
            Ok(Ok(stats)) => tracing::debug!(lines = stats.lines, events = stats.events, "event source finished"),
            Ok(Err(e)) => tracing::error!(error = %e, "event source failed"),
            Err(e) => tracing::error!(error = %e, "event source task failed"),
        }

        runtime.stop(DRAIN_GRACE).await;
        Ok::<_, anyhow::Error>(())
    });

    result
}

async fn open_events(events: &str) -> Result<EventReader> {
    if events == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(events)
        .await
        .with_context(|| format!("failed to open event stream {events}"))?;
    Ok(Box::new(BufReader::new(file)))
}
