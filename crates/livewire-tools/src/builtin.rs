//! Built-in tools registered by default.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::{BoxError, Tool};

/// Returns its arguments unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    async fn invoke(&self, arguments: Value) -> Result<Value, BoxError> {
        Ok(arguments)
    }
}

/// Returns the current UTC time.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    async fn invoke(&self, _arguments: Value) -> Result<Value, BoxError> {
        let now = chrono::Utc::now();
        Ok(serde_json::json!({
            "utc": now.to_rfc3339(),
            "unix_ms": now.timestamp_millis(),
        }))
    }
}

/// Register `echo` and `clock` on `registry`.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), ToolError> {
    registry.register("echo", EchoTool)?;
    registry.register("clock", ClockTool)?;
    Ok(())
}
