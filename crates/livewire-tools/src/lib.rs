//! Tool invocation runtime for livewire.
//!
//! Tools are named async capabilities the remote peer can call while a
//! stream is open. This crate provides:
//! - The `Tool` trait and a closure adapter (`tool_fn`)
//! - A thread-safe `ToolRegistry` shared across sessions
//! - Typed failures (`ToolError`) that are relayed instead of raised
//! - Built-in tools (`echo`, `clock`)

pub mod builtin;
pub mod error;
pub mod registry;
pub mod tool;

pub use builtin::{register_builtin_tools, ClockTool, EchoTool};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tool::{tool_fn, BoxError, FnTool, Tool};
