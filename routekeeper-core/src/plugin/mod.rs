mod claims;
mod error;
mod host_admitter;
mod rejection;
mod unique_host;


pub use error::PluginError;
pub use host_admitter::*;
pub use rejection::*;
pub use unique_host::*;

use crate::model::{Endpoints, EventType, Node, Route};
use std::collections::HashSet;

/// One stage of the route handling chain.
///
/// Stages wrap the next stage and decide whether, and in what shape, an
/// event continues downstream. Errors are reported to the caller, which logs
/// them; they never stop event delivery.
pub trait Plugin: Send + Sync {
    fn handle_route(&self, event: EventType, route: &Route) -> Result<(), PluginError>;

    fn handle_endpoints(&self, _event: EventType, _endpoints: &Endpoints) -> Result<(), PluginError> {
        Ok(())
    }

    fn handle_node(&self, _event: EventType, _node: &Node) -> Result<(), PluginError> {
        Ok(())
    }

    /// Replaces the set of namespaces routes may come from.
    fn handle_namespaces(&self, _namespaces: &HashSet<String>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once the current batch of events has been handled.
    fn commit(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
