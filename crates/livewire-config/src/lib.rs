//! livewire configuration.
//!
//! TOML-based configuration for the streaming session, the owner-side
//! reconnect policy, and logging. Every section uses serde defaults so
//! partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{LivewireConfig, LogLevel, LoggingConfig, ReconnectConfig, SessionSection};
pub use toml_loader::{default_config_path, load_default, load_from_path};

use livewire_common::ConfigError;

/// Load config from `path` when given, otherwise from the platform default path.
pub fn load_config(path: Option<&std::path::Path>) -> Result<LivewireConfig, ConfigError> {
    match path {
        Some(path) => load_from_path(path),
        None => load_default(),
    }
}
