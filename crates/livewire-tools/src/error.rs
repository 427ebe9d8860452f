//! Typed tool failures.

use std::time::Duration;

/// Terminal failure of one tool invocation.
///
/// Every variant is a routine outcome that is relayed to the remote peer;
/// none of them should ever tear down a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool '{tool}' failed: {message}")]
    ExecutionFailed { tool: String, message: String },

    #[error("tool '{tool}' timed out after {}ms", .after.as_millis())]
    Timeout { tool: String, after: Duration },

    #[error("invalid tool name: {0:?}")]
    InvalidName(String),
}

impl ToolError {
    /// Stable machine-readable code sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "tool_not_found",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::Timeout { .. } => "timeout",
            Self::InvalidName(_) => "invalid_name",
        }
    }

    /// JSON body for the `error` field of a failed tool result.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}
