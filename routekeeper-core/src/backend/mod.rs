mod plugin;
mod reloader;
mod state;


pub use plugin::*;
pub use reloader::*;
pub use state::*;
