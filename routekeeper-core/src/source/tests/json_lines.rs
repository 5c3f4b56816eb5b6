use crate::model::EventType;
use crate::queue::{EventQueues, FatalHook};
use crate::shutdown::ShutdownHandle;
use crate::source::*;
use crate::status::RouteLister;
use crate::store::InMemoryRouteStore;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;

// ---------------------------
// Helpers
// ---------------------------

struct Harness {
    queues: EventQueues,
    store: Arc<InMemoryRouteStore>,
    namespaces: watch::Receiver<Option<HashSet<String>>>,
}

fn harness() -> (Harness, EventSink) {
    let hook: FatalHook = Arc::new(|_| {});
    let queues = EventQueues::with_fatal_hook(hook);
    let store = Arc::new(InMemoryRouteStore::new());
    let (tx, namespaces) = watch::channel(None);
    let sink = EventSink::new(queues.clone(), store.clone(), tx);
    let h = Harness {
        queues,
        store,
        namespaces,
    };
    (h, sink)
}

fn route_line(event: &str, ns: &str, name: &str, host: &str) -> String {
    format!(
        r#"{{"kind":"Route","type":"{event}","object":{{"metadata":{{"namespace":"{ns}","name":"{name}","uid":"{ns}-{name}-uid"}},"spec":{{"host":"{host}","to":{{"name":"{name}-svc"}}}}}}}}"#
    )
}

async fn run(sink: EventSink, input: String) -> SourceStats {
    let shutdown = ShutdownHandle::new();
    let bytes = input.into_bytes();
    JsonLinesSource::new(BufReader::new(bytes.as_slice()), sink)
        .run(shutdown.subscribe())
        .await
        .unwrap()
}

// ---------------------------
// Tests
// ---------------------------

#[test]
fn decodes_every_kind() {
    let lines = [
        route_line("Added", "ns", "a", "a.test"),
        r#"{"kind":"Endpoints","type":"Modified","object":{"namespace":"ns","name":"a-svc","subsets":[]}}"#.into(),
        r#"{"kind":"Node","type":"Deleted","object":{"name":"node-1"}}"#.into(),
        r#"{"kind":"Namespaces","names":["ns"]}"#.into(),
        r#"{"kind":"ListComplete"}"#.into(),
    ];

    let events: Vec<WatchEvent> = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert!(matches!(&events[0], WatchEvent::Route { event: EventType::Added, object } if object.spec.host == "a.test"));
    assert!(matches!(&events[1], WatchEvent::Endpoints { event: EventType::Modified, .. }));
    assert!(matches!(&events[2], WatchEvent::Node { event: EventType::Deleted, object } if object.name == "node-1"));
    assert_eq!(events[3], WatchEvent::Namespaces { names: vec!["ns".into()] });
    assert_eq!(events[4], WatchEvent::ListComplete);
}

#[tokio::test]
async fn initial_list_is_replaced_then_events_are_added() {
    // Arrange
    let (h, sink) = harness();
    let input = [
        route_line("Added", "ns", "a", "a.test"),
        route_line("Added", "ns", "b", "b.test"),
        route_line("Modified", "ns", "a", "a2.test"),
        r#"{"kind":"ListComplete"}"#.into(),
        route_line("Added", "ns", "c", "c.test"),
    ]
    .join("\n");

    // Act
    let stats = run(sink, input).await;

    // Assert
    assert_eq!(stats, SourceStats { lines: 5, events: 5, malformed: 0 });
    let mut popped = Vec::new();
    while let Some((event, route)) = h.queues.routes.pop().await {
        popped.push((event, route.spec.host));
    }
    assert_eq!(
        popped,
        vec![
            (EventType::Added, "a2.test".to_string()),
            (EventType::Added, "b.test".to_string()),
            (EventType::Added, "c.test".to_string()),
        ]
    );
    assert!(h.queues.list_consumed());
}

#[tokio::test]
async fn routes_are_mirrored_into_store() {
    let (h, sink) = harness();
    let input = [
        r#"{"kind":"ListComplete"}"#.to_string(),
        route_line("Added", "ns", "a", "a.test"),
        route_line("Added", "ns", "b", "b.test"),
        route_line("Deleted", "ns", "b", "b.test"),
    ]
    .join("\n");

    run(sink, input).await;

    assert_eq!(h.store.get("ns", "a").unwrap().spec.host, "a.test");
    assert!(h.store.get("ns", "b").is_err());
    assert_eq!(h.queues.routes.len(), 1);
}

#[tokio::test]
async fn malformed_lines_are_dropped() {
    let (h, sink) = harness();
    let input = [
        "not json".to_string(),
        r#"{"kind":"Unknown"}"#.to_string(),
        String::new(),
        route_line("Added", "ns", "a", "a.test"),
    ]
    .join("\n");

    let stats = run(sink, input).await;

    assert_eq!(stats, SourceStats { lines: 4, events: 1, malformed: 2 });
    assert_eq!(h.queues.routes.len(), 1);
}

#[tokio::test]
async fn end_of_input_completes_list_and_closes() {
    let (h, sink) = harness();

    run(sink, route_line("Added", "ns", "a", "a.test")).await;

    assert!(h.queues.routes.is_closed());
    assert!(h.queues.endpoints.list_consumed());
    assert!(h.queues.nodes.list_consumed());
    assert!(h.queues.routes.pop().await.is_some());
    assert!(h.queues.routes.pop().await.is_none());
}

#[test]
fn namespaces_are_published() {
    let (h, mut sink) = harness();

    sink
        .apply(WatchEvent::Namespaces {
            names: vec!["a".into(), "b".into()],
        })
        .unwrap();

    let published = h.namespaces.borrow().clone().unwrap();
    assert_eq!(published, HashSet::from(["a".to_string(), "b".to_string()]));
}

#[test]
fn deleted_before_list_completes_is_forgotten() {
    let (h, mut sink) = harness();
    let added = serde_json::from_str(&route_line("Added", "ns", "a", "a.test")).unwrap();
    let deleted = serde_json::from_str(&route_line("Deleted", "ns", "a", "a.test")).unwrap();

    sink.apply(added).unwrap();
    sink.apply(deleted).unwrap();
    sink.complete_list();

    assert!(!sink.is_listing());
    assert!(h.queues.routes.is_empty());
    assert!(h.queues.routes.list_consumed());
}
