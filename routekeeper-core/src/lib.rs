pub mod backend;
pub mod clock;
pub mod conf;
pub mod contention;
pub mod controller;
pub mod lease;
pub mod logging;
pub mod model;
pub mod plugin;
pub mod queue;
pub mod reload;
pub mod runtime;
pub mod shutdown;
pub mod source;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
