//! livewire: streams stdin lines to a model backend over WebSocket, prints
//! what comes back, and answers the backend's tool calls with built-in tools.

mod cli;
mod reconnect;
mod runner;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use livewire_common::{ConfigError, LivewireError};
use livewire_config::{validation, LivewireConfig, SessionSection};
use livewire_session::{SessionConfig, WebSocketConnector};
use livewire_tools::{register_builtin_tools, ToolRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::reconnect::Backoff;
use crate::runner::{Exit, Runner};

fn init_logging(directive: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(directive))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn session_config(section: &SessionSection) -> SessionConfig {
    SessionConfig::new(section.endpoint.clone())
        .with_max_frame_bytes(section.max_frame_bytes as usize)
        .with_tool_timeout(Duration::from_secs(u64::from(section.tool_timeout_secs)))
        .with_event_capacity(section.event_capacity as usize)
}

/// Apply CLI overrides to the loaded config and validate the result.
///
/// A config that fails to load from an explicit `--config` path is fatal;
/// a failing default path falls back to defaults. An invalid final config
/// is always fatal.
fn prepare_config(
    loaded: Result<LivewireConfig, ConfigError>,
    args: &Args,
) -> Result<LivewireConfig, LivewireError> {
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) if args.config.is_some() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Config load failed, using defaults: {e}");
            LivewireConfig::default()
        }
    };
    if let Some(endpoint) = &args.endpoint {
        config.session.endpoint = endpoint.clone();
    }
    if args.no_reconnect {
        config.reconnect.enabled = false;
    }
    validation::validate(&config)?;
    Ok(config)
}

/// Read stdin lines into a channel; the channel closes on EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Build the runner from `config` and drive sessions until exit.
async fn run(config: LivewireConfig) -> livewire_common::Result<Exit> {
    let registry = ToolRegistry::new();
    register_builtin_tools(&registry).map_err(|e| LivewireError::Tool(e.to_string()))?;
    tracing::info!(tools = ?registry.list_names(), "Tool registry ready");

    let connector = WebSocketConnector::new(Duration::from_secs(u64::from(
        config.session.connect_timeout_secs,
    )));
    let backoff = config
        .reconnect
        .enabled
        .then(|| Backoff::from_config(&config.reconnect));

    let runner = Runner::new(
        session_config(&config.session),
        Arc::new(registry),
        Arc::new(connector),
        backoff,
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    Ok(runner.run(spawn_stdin_reader(), shutdown).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    let loaded = livewire_config::load_config(args.config.as_deref());

    let directive = args.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|config| config.logging.level)
            .unwrap_or_default()
            .as_filter()
            .to_string()
    });
    init_logging(&directive);

    tracing::info!("livewire v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match prepare_config(loaded, &args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let endpoint = config.session.endpoint.clone();

    match run(config).await {
        Ok(Exit::Shutdown | Exit::InputClosed) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Exit::Ended(info)) if info.is_normal() => ExitCode::SUCCESS,
        Ok(Exit::Ended(info)) => {
            tracing::error!("Session ended: {info}");
            ExitCode::FAILURE
        }
        Ok(Exit::GaveUp) => {
            tracing::error!("Could not reach {endpoint}");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
