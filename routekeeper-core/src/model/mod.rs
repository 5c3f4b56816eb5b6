mod endpoints;
mod event;
mod route;

pub use endpoints::*;
pub use event::*;
pub use route::*;
