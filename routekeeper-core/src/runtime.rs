use crate::backend::BackendPlugin;
use crate::clock::Clock;
use crate::conf::RouterConfig;
use crate::contention::SimpleContentionTracker;
use crate::controller::Controller;
use crate::lease::WriteLease;
use crate::plugin::{HostAdmitter, LogRejections, Plugin, RejectionRecorder, UniqueHost};
use crate::queue::EventQueues;
use crate::reload::ReloadPhase;
use crate::shutdown::{ShutdownHandle, ShutdownSignal};
use crate::source::EventSink;
use crate::status::StatusAdmitter;
use crate::store::InMemoryRouteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A running router: the plugin chain, the controller feeding it and the
/// background loops behind status writes and reloads.
pub struct RouterRuntime {
    pub config: RouterConfig,
    pub store: Arc<InMemoryRouteStore>,
    pub queues: EventQueues,
    pub controller: Arc<Controller>,
    pub backend: Arc<BackendPlugin>,
    pub host_admitter: Arc<HostAdmitter>,
    pub unique_host: Arc<UniqueHost>,
    pub status: Option<Arc<StatusAdmitter>>,
    pub tracker: Arc<SimpleContentionTracker>,
    pub lease: WriteLease,
    shutdown: ShutdownHandle,
    controller_task: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RouterRuntime {
    /// Builds the chain `HostAdmitter → UniqueHost → StatusAdmitter →
    /// BackendPlugin` and starts every background loop.
    ///
    /// The returned sink is the only writer of the namespace allow-list;
    /// dropping it (end of input) lets the controller finish.
    pub async fn start(
        config: RouterConfig,
        store: Arc<InMemoryRouteStore>,
        queues: EventQueues,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<(Self, EventSink)> {
        let shutdown = ShutdownHandle::new();
        let mut tasks = Vec::new();

        let tracker = Arc::new(SimpleContentionTracker::new(
            config.contention_params(),
            clock.clone(),
        ));
        tasks.push(tokio::spawn(tracker.clone().run(
            config.router.name.clone(),
            store.subscribe(),
            shutdown.subscribe(),
        )));

        let lease = WriteLease::new(config.lease_params());
        tasks.push(lease.spawn(shutdown.subscribe()));

        let backend = Arc::new(BackendPlugin::start(config.backend_options()).await?);
        tasks.push(backend.coalescer().spawn(shutdown.subscribe()));

        let (status, next, recorder): (
            Option<Arc<StatusAdmitter>>,
            Arc<dyn Plugin>,
            Arc<dyn RejectionRecorder>,
        ) = if config.status.enabled {
            let status = Arc::new(StatusAdmitter::new(
                backend.clone(),
                config.status_options(),
                store.clone(),
                store.clone(),
                tracker.clone(),
                lease.clone(),
                clock,
            ));
            (Some(status.clone()), status.clone(), status)
        } else {
            info!("route status writes disabled");
            (None, backend.clone(), Arc::new(LogRejections))
        };

        let unique_host = Arc::new(UniqueHost::new(
            next,
            recorder.clone(),
            config.hostname_generator(),
        ));
        let host_admitter = Arc::new(HostAdmitter::new(
            unique_host.clone(),
            config.admission_fn(),
            recorder,
            config.host_admitter_options(),
        ));

        let (namespaces_tx, namespaces_rx) = watch::channel(config.namespaces());
        let controller = Arc::new(Controller::new(host_admitter.clone(), queues.clone()));
        let controller_task = tokio::spawn(
            controller
                .clone()
                .run(namespaces_rx, shutdown.subscribe()),
        );
        let sink = EventSink::new(queues.clone(), store.clone(), namespaces_tx);

        info!(
            event = "router_started",
            router = %config.router.name,
            status = config.status.enabled,
            "router started"
        );

        let runtime = Self {
            config,
            store,
            queues,
            controller,
            backend,
            host_admitter,
            unique_host,
            status,
            tracker,
            lease,
            shutdown,
            controller_task: Some(controller_task),
            tasks,
        };
        Ok((runtime, sink))
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    /// Resolves once the controller has drained every queue or was stopped.
    pub async fn wait_controller(&mut self) {
        let Some(task) = self.controller_task.as_mut() else {
            return;
        };
        let result = task.await;
        self.controller_task = None;
        if let Err(err) = result {
            error!(error = %err, "controller task failed");
        }
    }

    /// Stops the router. Unless shutdown was already signaled, queued status
    /// writes get up to `grace` to finish and a pending reload runs first.
    pub async fn stop(mut self, grace: Duration) {
        if !self.shutdown.is_triggered() {
            if !self.lease.wait_idle(grace).await {
                warn!(pending = self.lease.pending(), "status writes still pending at shutdown");
            }
            if self.backend.coalescer().phase() == ReloadPhase::Pending
                && let Err(err) = self.backend.coalescer().commit_now().await
            {
                error!(error = %err, "final backend reload failed");
            }
        }

        self.shutdown.trigger();
        self.wait_controller().await;
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                error!(error = %err, "background task failed");
            }
        }
        info!(event = "router_stopped", "router stopped");
    }
}
