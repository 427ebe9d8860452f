//! Configuration schema.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LivewireConfig {
    pub session: SessionSection,
    pub reconnect: ReconnectConfig,
    pub logging: LoggingConfig,
}

/// Streaming session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// WebSocket URL of the model backend.
    pub endpoint: String,
    /// Seconds to wait for the transport handshake (valid range: 1-120).
    pub connect_timeout_secs: u32,
    /// Largest frame accepted or produced, in bytes (valid range: 1024-67108864).
    pub max_frame_bytes: u32,
    /// Upper bound for a single tool invocation (valid range: 1-3600).
    pub tool_timeout_secs: u32,
    /// Buffer size of the session event broadcast (valid range: 1-65536).
    pub event_capacity: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8765/stream".into(),
            connect_timeout_secs: 15,
            max_frame_bytes: 1024 * 1024,
            tool_timeout_secs: 30,
            event_capacity: 256,
        }
    }
}

/// Reconnect policy applied by the session owner.
///
/// A session never reconnects itself; the owner builds a new one per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub base_delay_secs: u32,
    pub max_delay_secs: u32,
    /// 0 means retry forever.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_secs: 1,
            max_delay_secs: 30,
            max_attempts: 0,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
