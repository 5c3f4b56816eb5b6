use crate::model::{Endpoints, EventType, Node, Route};
use serde::{Deserialize, Serialize};

/// One line of the event stream.
///
/// ```json
/// {"kind":"Route","type":"Added","object":{"metadata":{"namespace":"ns","name":"web"},"spec":{"host":"web.example.com"}}}
/// {"kind":"Namespaces","names":["ns"]}
/// {"kind":"ListComplete"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WatchEvent {
    Route {
        #[serde(rename = "type")]
        event: EventType,
        object: Route,
    },
    Endpoints {
        #[serde(rename = "type")]
        event: EventType,
        object: Endpoints,
    },
    Node {
        #[serde(rename = "type")]
        event: EventType,
        object: Node,
    },
    /// Full namespace allow-list, replacing the previous one.
    Namespaces { names: Vec<String> },
    /// Ends the initial list; later events are incremental.
    ListComplete,
}
