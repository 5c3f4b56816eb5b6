use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Mutex, Once};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// One log event, fields rendered to strings.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub target: String,
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Value of the `event` field every decision log carries.
    pub fn kind(&self) -> Option<&str> {
        self.field("event")
    }
}

static CAPTURED: Mutex<Vec<CapturedEvent>> = Mutex::new(Vec::new());

/// Routes every event of the test binary into [`captured_events`].
struct CaptureLayer;

/// Installs the capturing subscriber once per test binary.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer);
        tracing::subscriber::set_global_default(subscriber)
            .expect("failed to set global tracing subscriber");
    });
}

/// Every event captured so far, across all tests of the binary.
pub fn captured_events() -> Vec<CapturedEvent> {
    CAPTURED.lock().unwrap().clone()
}

/// Captured events whose `event` field is `kind`.
pub fn events_of_kind(kind: &str) -> Vec<CapturedEvent> {
    captured_events()
        .into_iter()
        .filter(|e| e.kind() == Some(kind))
        .collect()
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        event.record(&mut fields);

        let meta = event.metadata();
        CAPTURED.lock().unwrap().push(CapturedEvent {
            target: meta.target().to_string(),
            level: *meta.level(),
            fields: fields.0,
        });
    }
}

#[derive(Default)]
struct FieldMap(BTreeMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}
