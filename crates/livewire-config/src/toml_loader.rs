//! TOML config file loading and creation.

use crate::schema::LivewireConfig;
use crate::validation;
use livewire_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load config from a specific TOML file path.
///
/// Missing fields take serde defaults. Validation failures are logged as
/// warnings and the parsed config is returned as-is; callers that need a
/// valid config run `validation::validate` themselves.
pub fn load_from_path(path: &Path) -> Result<LivewireConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: LivewireConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path, creating a
/// commented default file on first run.
pub fn load_default() -> Result<LivewireConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(LivewireConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("livewire").join("config.toml"))
}

/// Write the default TOML config with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TOML).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

const DEFAULT_CONFIG_TOML: &str = r##"# livewire configuration
# Only override what you want to change -- missing fields use defaults.

[session]
# endpoint = "ws://127.0.0.1:8765/stream"
# connect_timeout_secs = 15     # 1-120
# max_frame_bytes = 1048576     # 1024-67108864
# tool_timeout_secs = 30        # 1-3600
# event_capacity = 256          # 1-65536

[reconnect]
# enabled = true
# base_delay_secs = 1
# max_delay_secs = 30
# max_attempts = 0              # 0 = unlimited

[logging]
# level = "info"                # trace, debug, info, warn, error
"##;
