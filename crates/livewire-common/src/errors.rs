use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Top-level error for the binary and for callers that glue crates together.
///
/// Library crates keep their own narrower error types (`SessionError`,
/// `ToolError`); this enum is what they collapse into at the edges.
#[derive(Debug, thiserror::Error)]
pub enum LivewireError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}
