use crate::model::EventType;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid event transition for {key}: {from} followed by {to}")]
    InvalidTransition {
        key: String,
        from: EventType,
        to: EventType,
    },

    #[error("event queue is closed")]
    Closed,
}

/// Called when the queue reaches a state it cannot recover from.
pub type FatalHook = Arc<dyn Fn(&QueueError) + Send + Sync>;

/// Exit status used when a queue is corrupted.
pub const FATAL_EXIT_CODE: i32 = 3;

/// Logs the error and exits the process.
pub fn exit_on_fatal() -> FatalHook {
    Arc::new(|err| {
        error!(event = "queue_fatal", error = %err, "event queue corrupted, exiting");
        std::process::exit(FATAL_EXIT_CODE);
    })
}
