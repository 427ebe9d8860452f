//! The `Tool` trait and closure adapter.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Error type a tool may raise; the registry converts it into a `ToolError`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A named, asynchronously-invokable capability.
///
/// The name lives in the registry, not on the tool, so the same
/// implementation can be registered under several names.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<Value, BoxError>;
}

/// Adapter turning an async closure into a `Tool`.
pub struct FnTool<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BoxError>> + Send,
{
    async fn invoke(&self, arguments: Value) -> Result<Value, BoxError> {
        (self.f)(arguments).await
    }
}

/// Wrap an async closure as a tool.
///
/// ```rust
/// use livewire_tools::{tool_fn, BoxError, ToolRegistry};
///
/// let registry = ToolRegistry::new();
/// registry
///     .register("double", tool_fn(|args| async move {
///         let n = args["n"].as_i64().unwrap_or_default();
///         Ok::<_, BoxError>(serde_json::json!({ "n": n * 2 }))
///     }))
///     .unwrap();
/// ```
pub fn tool_fn<F, Fut>(f: F) -> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BoxError>> + Send,
{
    FnTool { f }
}
