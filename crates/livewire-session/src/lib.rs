//! Streaming session for livewire.
//!
//! One `Session` owns one duplex connection to a model backend. It frames
//! messages as JSON text, surfaces them through callbacks (or a broadcast
//! subscription), and answers `toolCall` requests from the remote peer by
//! running tools from a shared `ToolRegistry` on independent tasks.
//!
//! The session is written against the `Connector`/`Transport` traits; a
//! WebSocket implementation and an in-memory one are provided.

pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{SessionError, TransportError};
pub use protocol::{Codec, CodecError, Message, ToolCallRequest, ToolCallResult};
pub use session::{Session, SessionConfig, SessionEvent, SessionState};
pub use transport::memory::{MemoryConnector, MemoryPeer};
pub use transport::websocket::WebSocketConnector;
pub use transport::{CloseInfo, Connector, Transport, TransportEvent};
