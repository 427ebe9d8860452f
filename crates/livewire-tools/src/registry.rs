//! Name → tool mapping shared by every session in the process.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tool::Tool;

/// Thread-safe tool registry.
///
/// Reads (`invoke`, `list_names`) and writes (`register`, `unregister`) may
/// interleave freely; the lock is never held across an `.await`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under `name`, replacing any existing entry.
    ///
    /// Returns the replaced tool, if any. A replacement is also logged
    /// since most callers ignore the return value.
    pub fn register(
        &self,
        name: impl Into<String>,
        tool: impl Tool + 'static,
    ) -> Result<Option<Arc<dyn Tool>>, ToolError> {
        self.register_arc(name, Arc::new(tool))
    }

    /// Like `register`, for a tool that is already shared.
    pub fn register_arc(
        &self,
        name: impl Into<String>,
        tool: Arc<dyn Tool>,
    ) -> Result<Option<Arc<dyn Tool>>, ToolError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidName(name));
        }

        let previous = self.write().insert(name.clone(), tool);
        if previous.is_some() {
            warn!(tool = %name, "Tool re-registered, previous entry replaced");
        } else {
            debug!(tool = %name, "Tool registered");
        }
        Ok(previous)
    }

    /// Remove `name`. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.write().remove(name).is_some();
        if removed {
            debug!(tool = %name, "Tool unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted snapshot of the registered names.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Look up `name` and run it.
    ///
    /// Never panics and never propagates a tool's panic: an unknown name is
    /// `NotFound`, a tool error or panic is `ExecutionFailed`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        debug!(tool = %name, "Invoking tool");
        match AssertUnwindSafe(tool.invoke(arguments)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                debug!(tool = %name, error = %e, "Tool returned an error");
                Err(ToolError::ExecutionFailed {
                    tool: name.to_string(),
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %name, panic = %message, "Tool panicked");
                Err(ToolError::ExecutionFailed {
                    tool: name.to_string(),
                    message: format!("panicked: {message}"),
                })
            }
        }
    }

    /// `invoke` bounded by `timeout`.
    pub async fn invoke_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        match tokio::time::timeout(timeout, self.invoke(name, arguments)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                warn!(tool = %name, timeout_ms = timeout.as_millis() as u64, "Tool timed out");
                Err(ToolError::Timeout {
                    tool: name.to_string(),
                    after: timeout,
                })
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
