mod config;
mod modules;

pub use config::{ConfigError, HsdConfig};
pub use modules::{load_module_list, parse_module_list};
