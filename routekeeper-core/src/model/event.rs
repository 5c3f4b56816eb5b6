use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change delivered by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Added => "Added",
            EventType::Modified => "Modified",
            EventType::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// One observed change of a stored route, as seen by a watcher.
#[derive(Debug, Clone)]
pub struct RouteUpdate {
    pub old: Option<crate::model::Route>,
    pub new: crate::model::Route,
}
