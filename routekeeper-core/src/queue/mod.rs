mod error;
mod event_queue;


pub use error::*;
pub use event_queue::*;

use crate::model::{Endpoints, Node, Route};

/// The three watched resource queues feeding the controller.
#[derive(Clone)]
pub struct EventQueues {
    pub routes: EventQueue<Route>,
    pub endpoints: EventQueue<Endpoints>,
    pub nodes: EventQueue<Node>,
}

impl EventQueues {
    pub fn new() -> Self {
        Self::with_fatal_hook(exit_on_fatal())
    }

    pub fn with_fatal_hook(hook: FatalHook) -> Self {
        Self {
            routes: EventQueue::with_fatal_hook("routes", hook.clone()),
            endpoints: EventQueue::with_fatal_hook("endpoints", hook.clone()),
            nodes: EventQueue::with_fatal_hook("nodes", hook),
        }
    }

    /// Whether every queue has handed out its initial list.
    pub fn list_consumed(&self) -> bool {
        self.routes.list_consumed() && self.endpoints.list_consumed() && self.nodes.list_consumed()
    }

    pub async fn wait_list_consumed(&self) {
        self.routes.wait_list_consumed().await;
        self.endpoints.wait_list_consumed().await;
        self.nodes.wait_list_consumed().await;
    }

    pub fn close(&self) {
        self.routes.close();
        self.endpoints.close();
        self.nodes.close();
    }
}

impl Default for EventQueues {
    fn default() -> Self {
        Self::new()
    }
}
