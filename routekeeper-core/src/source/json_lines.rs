use super::WatchEvent;
use crate::model::{Endpoints, EventType, Node, Route};
use crate::queue::{EventQueues, QueueError};
use crate::shutdown::ShutdownSignal;
use crate::store::InMemoryRouteStore;
use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Namespace allow-list as published by the source. `None` serves every
/// namespace.
pub type NamespaceSender = watch::Sender<Option<HashSet<String>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub events: u64,
    pub malformed: u64,
}

/// Events seen before the list completed, folded per key.
#[derive(Default)]
struct InitialList {
    routes: Vec<(String, Route)>,
    endpoints: Vec<(String, Endpoints)>,
    nodes: Vec<(String, Node)>,
}

fn fold_initial<T>(list: &mut Vec<(String, T)>, key: String, event: EventType, item: T) {
    let position = list.iter().position(|(k, _)| *k == key);
    match (event, position) {
        (EventType::Deleted, Some(i)) => {
            list.remove(i);
        }
        (EventType::Deleted, None) => {}
        (_, Some(i)) => list[i].1 = item,
        (_, None) => list.push((key, item)),
    }
}

/// Applies decoded watch events to the queues and the route store.
pub struct EventSink {
    queues: EventQueues,
    store: Arc<InMemoryRouteStore>,
    namespaces: NamespaceSender,
    initial: Option<InitialList>,
}

impl EventSink {
    pub fn new(
        queues: EventQueues,
        store: Arc<InMemoryRouteStore>,
        namespaces: NamespaceSender,
    ) -> Self {
        Self {
            queues,
            store,
            namespaces,
            initial: Some(InitialList::default()),
        }
    }

    pub fn is_listing(&self) -> bool {
        self.initial.is_some()
    }

    pub fn apply(&mut self, event: WatchEvent) -> Result<(), QueueError> {
        match event {
            WatchEvent::Route { event, object } => {
                let route = self.mirror(event, object);
                let key = route.key().to_string();
                match &mut self.initial {
                    Some(list) => fold_initial(&mut list.routes, key, event, route),
                    None => self.queues.routes.add(key, event, route)?,
                }
            }
            WatchEvent::Endpoints { event, object } => {
                let key = object.key();
                match &mut self.initial {
                    Some(list) => fold_initial(&mut list.endpoints, key, event, object),
                    None => self.queues.endpoints.add(key, event, object)?,
                }
            }
            WatchEvent::Node { event, object } => {
                let key = object.name.clone();
                match &mut self.initial {
                    Some(list) => fold_initial(&mut list.nodes, key, event, object),
                    None => self.queues.nodes.add(key, event, object)?,
                }
            }
            WatchEvent::Namespaces { names } => {
                let names: HashSet<String> = names.into_iter().collect();
                debug!(namespaces = names.len(), "namespace allow-list updated");
                self.namespaces.send_replace(Some(names));
            }
            WatchEvent::ListComplete => self.complete_list(),
        }
        Ok(())
    }

    /// Keeps the store in step with the stream and returns the stored copy.
    fn mirror(&self, event: EventType, route: Route) -> Route {
        match event {
            EventType::Added | EventType::Modified => self.store.upsert(route),
            EventType::Deleted => {
                let removed = self.store.delete(route.namespace(), route.name());
                match removed {
                    Some(stored) if route.uid().is_empty() => stored,
                    _ => route,
                }
            }
        }
    }

    /// Hands the initial list to the queues. Later calls do nothing.
    pub fn complete_list(&mut self) {
        let Some(list) = self.initial.take() else {
            return;
        };
        info!(
            event = "list_complete",
            routes = list.routes.len(),
            endpoints = list.endpoints.len(),
            nodes = list.nodes.len(),
            "initial list complete"
        );
        self.queues.routes.replace(list.routes);
        self.queues.endpoints.replace(list.endpoints);
        self.queues.nodes.replace(list.nodes);
    }

    /// Completes a pending list and closes the queues.
    pub fn finish(&mut self) {
        if self.is_listing() {
            warn!("event stream ended before the initial list completed");
        }
        self.complete_list();
        self.queues.close();
    }
}

/// Reads newline-delimited JSON watch events from `reader`.
pub struct JsonLinesSource<R> {
    reader: R,
    sink: EventSink,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, sink: EventSink) -> Self {
        Self { reader, sink }
    }

    /// Runs until end of input or shutdown, then closes the queues.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> anyhow::Result<SourceStats> {
        let Self { reader, mut sink } = self;
        let mut lines = reader.lines();
        let mut stats = SourceStats::default();

        loop {
            let line = tokio::select! {
                _ = shutdown.wait() => break,
                line = lines.next_line() => line,
            };
            let line = match line.context("failed to read event stream") {
                Ok(line) => line,
                Err(err) => {
                    sink.finish();
                    return Err(err);
                }
            };
            let Some(line) = line else {
                break;
            };

            stats.lines += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: WatchEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(err) => {
                    stats.malformed += 1;
                    warn!(line = stats.lines, error = %err, "dropping malformed event");
                    continue;
                }
            };
            stats.events += 1;

            if let Err(err) = sink.apply(event) {
                error!(line = stats.lines, error = %err, "event rejected by queue");
            }
        }

        sink.finish();
        info!(
            event = "source_closed",
            lines = stats.lines,
            events = stats.events,
            malformed = stats.malformed,
            "event stream closed"
        );
        Ok(stats)
    }
}
