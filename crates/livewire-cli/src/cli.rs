use std::path::PathBuf;

use clap::Parser;

/// livewire: stream messages to a model backend and answer its tool calls.
#[derive(Parser, Debug)]
#[command(name = "livewire", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint override (ws:// or wss://).
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Exit when the first session ends instead of reconnecting.
    #[arg(long)]
    pub no_reconnect: bool,

    /// Log filter override (e.g. `debug`, `livewire_session=trace`).
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}
