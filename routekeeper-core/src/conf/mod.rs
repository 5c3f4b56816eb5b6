mod error;
mod loader;
mod normalize;
pub mod types;


pub use error::ConfigError;
pub use loader::{CONFIG_FILE, load_config, load_config_with_env, parse_config};
pub use types::RouterConfig;
