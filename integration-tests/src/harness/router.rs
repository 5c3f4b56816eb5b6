use routekeeper_core::clock;
use routekeeper_core::conf::RouterConfig;
use routekeeper_core::model::{ConditionType, RouteIngressCondition};
use routekeeper_core::queue::{EventQueues, FatalHook};
use routekeeper_core::runtime::RouterRuntime;
use routekeeper_core::source::{JsonLinesSource, SourceStats};
use routekeeper_core::status::RouteLister;
use routekeeper_core::store::InMemoryRouteStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// The Admitted condition `router` wrote on `namespace/name`.
pub fn admitted_condition(
    store: &InMemoryRouteStore,
    namespace: &str,
    name: &str,
    router: &str,
) -> Option<RouteIngressCondition> {
    let route = store.get(namespace, name).ok()?;
    route
        .ingress_for(router)?
        .condition(ConditionType::Admitted)
        .cloned()
}

/// A router fed through an in-memory pipe.
pub struct TestRouter {
    pub runtime: RouterRuntime,
    input: Option<DuplexStream>,
    source: Option<JoinHandle<anyhow::Result<SourceStats>>>,
    _state_dir: TempDir,
}

/// Config with fast reloads and short leases.
pub fn test_config(name: &str) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.router.name = name.to_string();
    config.reload.interval_ms = 20;
    config.reload.gap_ms = 0;
    config.reload.event_wait_ms = 5;
    config.status.lease_duration_seconds = 1;
    config.status.retry_interval_ms = 50;
    config
}

impl TestRouter {
    pub async fn start(store: Arc<InMemoryRouteStore>, mut config: RouterConfig) -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        config.router.state_dir = state_dir.path().to_path_buf();

        let hook: FatalHook = Arc::new(|err| panic!("event queue corrupted: {err}"));
        let queues = EventQueues::with_fatal_hook(hook);
        let (runtime, sink) = RouterRuntime::start(config, store, queues, clock::system())
            .await
            .unwrap();

        let (input, output) = tokio::io::duplex(64 * 1024);
        let source = tokio::spawn(
            JsonLinesSource::new(BufReader::new(output), sink).run(runtime.shutdown_signal()),
        );

        Self {
            runtime,
            input: Some(input),
            source: Some(source),
            _state_dir: state_dir,
        }
    }

    pub async fn send(&mut self, lines: &[String]) {
        let input = self.input.as_mut().expect("input already closed");
        for line in lines {
            input.write_all(line.as_bytes()).await.unwrap();
            input.write_all(b"\n").await.unwrap();
        }
        input.flush().await.unwrap();
    }

    /// Waits until `count` events went through the chain and status writes
    /// settled.
    pub async fn settle(&self, count: u64) {
        let controller = self.runtime.controller.clone();
        assert!(
            eventually(TIMEOUT, || controller.handled() >= count).await,
            "controller handled {} of {count} events",
            controller.handled()
        );
        self.runtime.lease.wait_idle(TIMEOUT).await;
    }

    /// Ends the input and runs the router down.
    pub async fn stop(mut self) -> SourceStats {
        self.input.take();
        let stats = match self.source.take() {
            Some(source) => source.await.unwrap().unwrap(),
            None => SourceStats::default(),
        };
        self.runtime.wait_controller().await;
        self.runtime.stop(Duration::from_secs(1)).await;
        stats
    }
}
