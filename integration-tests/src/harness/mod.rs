pub mod events;
pub mod router;
pub mod tracing;

pub use self::router::{TestRouter, admitted_condition, eventually};
pub use self::tracing::{CapturedEvent, captured_events, events_of_kind, init_test_tracing};
