
use crate::model::EventType;
use crate::plugin::{Plugin, PluginError};
use crate::queue::{EventQueue, EventQueues};
use crate::shutdown::ShutdownSignal;
use arc_swap::ArcSwapOption;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Handler<T> = fn(&dyn Plugin, EventType, &T) -> Result<(), PluginError>;

/// Feeds queued events through the plugin chain.
///
/// Every handler runs under one lock, so the chain sees a single ordered
/// stream even though each queue has its own task. Once all initial lists
/// are consumed the chain is committed after every event.
pub struct Controller {
    plugin: Arc<dyn Plugin>,
    queues: EventQueues,
    lock: Mutex<()>,
    namespaces: ArcSwapOption<HashSet<String>>,
    committed: AtomicBool,
    handled: AtomicU64,
}

impl Controller {
    pub fn new(plugin: Arc<dyn Plugin>, queues: EventQueues) -> Self {
        Self {
            plugin,
            queues,
            lock: Mutex::new(()),
            namespaces: ArcSwapOption::empty(),
            committed: AtomicBool::new(false),
            handled: AtomicU64::new(0),
        }
    }

    /// Current namespace allow-list, `None` when every namespace is served.
    pub fn namespaces(&self) -> Option<Arc<HashSet<String>>> {
        self.namespaces.load_full()
    }

    /// Events handled so far, failed ones included.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Acquire)
    }

    /// Runs until every queue is closed and drained, or shutdown.
    pub async fn run(
        self: Arc<Self>,
        namespaces: watch::Receiver<Option<HashSet<String>>>,
        shutdown: ShutdownSignal,
    ) {
        info!(event = "controller", "controller started");

        let tasks: Vec<JoinHandle<()>> = vec![
            self.spawn_queue(self.queues.routes.clone(), shutdown.clone(), |p, e, r| {
                p.handle_route(e, r)
            }),
            self.spawn_queue(self.queues.endpoints.clone(), shutdown.clone(), |p, e, ep| {
                p.handle_endpoints(e, ep)
            }),
            self.spawn_queue(self.queues.nodes.clone(), shutdown.clone(), |p, e, n| {
                p.handle_node(e, n)
            }),
            tokio::spawn(self.clone().watch_namespaces(namespaces, shutdown.clone())),
            tokio::spawn(self.clone().initial_sync(shutdown)),
        ];

        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "controller task failed");
            }
        }
        info!(event = "controller", handled = self.handled(), "controller stopped");
    }

    fn spawn_queue<T: Send + 'static>(
        self: &Arc<Self>,
        queue: EventQueue<T>,
        mut shutdown: ShutdownSignal,
        handler: Handler<T>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = shutdown.wait() => break,
                    next = queue.pop() => next,
                };
                let Some((event, item)) = next else {
                    break;
                };

                let _guard = controller.lock.lock().await;
                if let Err(err) = handler(controller.plugin.as_ref(), event, &item) {
                    log_plugin_error(queue.name(), event, &err);
                }
                if controller.queues.list_consumed() {
                    controller.commit();
                }
                // Counted last so a reader seeing the count also sees its effects.
                controller.handled.fetch_add(1, Ordering::Release);
            }
            debug!(queue = queue.name(), "queue worker stopped");
        })
    }

    async fn watch_namespaces(
        self: Arc<Self>,
        mut updates: watch::Receiver<Option<HashSet<String>>>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            let current = updates.borrow_and_update().clone();
            if let Some(namespaces) = current {
                self.apply_namespaces(namespaces).await;
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn apply_namespaces(&self, namespaces: HashSet<String>) {
        let namespaces = Arc::new(namespaces);

        let _guard = self.lock.lock().await;
        info!(namespaces = namespaces.len(), "namespace allow-list changed");
        if let Err(err) = self.plugin.handle_namespaces(&namespaces) {
            error!(error = %err, "namespace update failed");
        }
        // Published after the chain so readers see a list already in force.
        self.namespaces.store(Some(namespaces));
        if self.queues.list_consumed() {
            self.commit();
        }
    }

    /// Commits once the initial lists are consumed, even when they were
    /// empty and no event will follow.
    async fn initial_sync(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        tokio::select! {
            _ = shutdown.wait() => return,
            _ = self.queues.wait_list_consumed() => {}
        }

        let _guard = self.lock.lock().await;
        if !self.committed.load(Ordering::Relaxed) {
            info!(event = "initial_sync", "initial lists consumed");
            self.commit();
        }
    }

    fn commit(&self) {
        self.committed.store(true, Ordering::Relaxed);
        if let Err(err) = self.plugin.commit() {
            error!(error = %err, "commit failed");
        }
    }
}

fn log_plugin_error(queue: &str, event: EventType, err: &PluginError) {
    match err {
        PluginError::Rejected { .. } | PluginError::NotAdmitted { .. } => {
            debug!(queue, %event, error = %err, "event stopped by plugin chain");
        }
        PluginError::Backend(_) => {
            error!(queue, %event, error = %err, "event handling failed");
        }
    }
}
