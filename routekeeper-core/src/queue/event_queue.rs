use super::{FatalHook, QueueError, exit_on_fatal};
use crate::model::EventType;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, trace};

struct QueueState<T> {
    items: HashMap<String, (EventType, T)>,
    order: VecDeque<String>,
    /// Keys of the initial list not yet popped.
    initial: HashSet<String>,
    populated: bool,
    closed: bool,
}

struct Shared<T> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    wake: Notify,
    consumed: watch::Sender<bool>,
    fatal: FatalHook,
}

/// Keyed FIFO of watch events.
///
/// A key is queued once; later events for it are folded into the queued one
/// so the consumer only sees the net change.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Net effect of two events on the same key. `None` inside `Ok` means the
/// events cancel out.
fn compress(from: EventType, to: EventType) -> Result<Option<EventType>, (EventType, EventType)> {
    use EventType::*;
    match (from, to) {
        (Added, Modified) => Ok(Some(Added)),
        (Added, Deleted) => Ok(None),
        (Modified, Modified) => Ok(Some(Modified)),
        (Modified, Deleted) => Ok(Some(Deleted)),
        (Deleted, Added) => Ok(Some(Modified)),
        other => Err(other),
    }
}

impl<T: Send + 'static> EventQueue<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_fatal_hook(name, exit_on_fatal())
    }

    pub fn with_fatal_hook(name: &'static str, fatal: FatalHook) -> Self {
        let (consumed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(QueueState {
                    items: HashMap::new(),
                    order: VecDeque::new(),
                    initial: HashSet::new(),
                    populated: false,
                    closed: false,
                }),
                wake: Notify::new(),
                consumed,
                fatal,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Queues an incremental event, folding it into a queued event for the
    /// same key.
    pub fn add(&self, key: impl Into<String>, event: EventType, item: T) -> Result<(), QueueError> {
        let key = key.into();
        let mut state = self.state();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let queued = state.items.get(&key).map(|(queued, _)| *queued);
        let Some(queued) = queued else {
            trace!(queue = self.shared.name, key = %key, %event, "queued");
            state.items.insert(key.clone(), (event, item));
            state.order.push_back(key);
            drop(state);
            self.shared.wake.notify_one();
            return Ok(());
        };

        match compress(queued, event) {
            Ok(Some(folded)) => {
                trace!(
                    queue = self.shared.name,
                    key = %key,
                    from = %queued,
                    to = %event,
                    %folded,
                    "compressed"
                );
                state.items.insert(key, (folded, item));
                Ok(())
            }
            Ok(None) => {
                trace!(queue = self.shared.name, key = %key, "events cancelled out");
                state.items.remove(&key);
                state.order.retain(|k| k != &key);
                state.initial.remove(&key);
                let consumed = state.populated && state.initial.is_empty();
                drop(state);
                if consumed {
                    self.shared.consumed.send_replace(true);
                }
                Ok(())
            }
            Err((from, to)) => {
                drop(state);
                let err = QueueError::InvalidTransition { key, from, to };
                (self.shared.fatal)(&err);
                Err(err)
            }
        }
    }

    /// Replaces the queue content with an initial list, delivered as Added
    /// events in the given order.
    pub fn replace(&self, items: Vec<(String, T)>) {
        let mut state = self.state();
        state.items.clear();
        state.order.clear();
        state.initial.clear();
        for (key, item) in items {
            if state.items.insert(key.clone(), (EventType::Added, item)).is_none() {
                state.order.push_back(key.clone());
            }
            state.initial.insert(key);
        }
        state.populated = true;
        let listed = state.initial.len();
        let consumed = state.initial.is_empty();
        drop(state);

        info!(queue = self.shared.name, listed, "initial list loaded");
        self.shared.consumed.send_replace(consumed);
        self.shared.wake.notify_one();
    }

    /// True once the initial list was loaded and every listed key was popped
    /// or compressed away.
    pub fn list_consumed(&self) -> bool {
        *self.shared.consumed.borrow()
    }

    pub async fn wait_list_consumed(&self) {
        let mut rx = self.shared.consumed.subscribe();
        let _ = rx.wait_for(|consumed| *consumed).await;
    }

    /// Next event in FIFO order, or `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<(EventType, T)> {
        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                while let Some(key) = state.order.pop_front() {
                    let Some((event, item)) = state.items.remove(&key) else {
                        continue;
                    };
                    let was_initial = state.initial.remove(&key);
                    let consumed = was_initial && state.populated && state.initial.is_empty();
                    drop(state);
                    if consumed {
                        debug!(queue = self.shared.name, "initial list consumed");
                        self.shared.consumed.send_replace(true);
                    }
                    return Some((event, item));
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops accepting events. Queued events are still handed out.
    pub fn close(&self) {
        self.state().closed = true;
        self.shared.wake.notify_waiters();
        self.shared.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
