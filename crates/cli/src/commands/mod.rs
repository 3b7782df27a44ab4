pub mod config;
pub mod proxies;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use proxies::{handle_proxies_command, ProxiesCommands};
