//! Wire protocol: one compact JSON object per frame.
//!
//! ```text
//! {"kind":"data","payload":<any>}
//! {"kind":"toolCall","correlationId":"1","name":"echo","arguments":<any>}
//! {"kind":"toolResult","correlationId":"1","ok":true,"value":<any>}
//! {"kind":"toolResult","correlationId":"1","ok":false,"error":<any>}
//! {"kind":"error","detail":"..."}
//! ```

use livewire_tools::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default upper bound on a single frame, in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Opaque content for the observer (model output, user input).
    Data { payload: Value },
    /// Request to run a tool on the receiving side.
    ToolCall(ToolCallRequest),
    /// Terminal outcome of a tool call.
    ToolResult(ToolCallResult),
    /// Control-level error reported by the peer.
    Error { detail: String },
}

impl Message {
    pub fn data(payload: impl Into<Value>) -> Self {
        Self::Data {
            payload: payload.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }

    /// The wire `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data { .. } => "data",
            Self::ToolCall(_) => "toolCall",
            Self::ToolResult(_) => "toolResult",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub correlation_id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub correlation_id: String,
    /// `Ok(value)` or `Err(error payload)`.
    pub outcome: Result<Value, Value>,
}

impl ToolCallResult {
    /// Build a result from a registry outcome; failures become `{code, message}`.
    pub fn from_outcome(
        correlation_id: impl Into<String>,
        outcome: Result<Value, ToolError>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: outcome.map_err(|e| e.to_payload()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Wire representation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WireOut<'a> {
    Data {
        payload: &'a Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        correlation_id: &'a str,
        name: &'a str,
        arguments: &'a Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        correlation_id: &'a str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<&'a Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a Value>,
    },
    Error {
        detail: &'a str,
    },
}

impl<'a> From<&'a Message> for WireOut<'a> {
    fn from(message: &'a Message) -> Self {
        match message {
            Message::Data { payload } => WireOut::Data { payload },
            Message::ToolCall(call) => WireOut::ToolCall {
                correlation_id: &call.correlation_id,
                name: &call.name,
                arguments: &call.arguments,
            },
            Message::ToolResult(result) => match &result.outcome {
                Ok(value) => WireOut::ToolResult {
                    correlation_id: &result.correlation_id,
                    ok: true,
                    value: Some(value),
                    error: None,
                },
                Err(error) => WireOut::ToolResult {
                    correlation_id: &result.correlation_id,
                    ok: false,
                    value: None,
                    error: Some(error),
                },
            },
            Message::Error { detail } => WireOut::Error { detail },
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WireIn {
    Data {
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        correlation_id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        correlation_id: String,
        ok: bool,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
    Error {
        detail: String,
    },
}

impl TryFrom<WireIn> for Message {
    type Error = CodecError;

    fn try_from(wire: WireIn) -> Result<Self, CodecError> {
        match wire {
            WireIn::Data { payload } => Ok(Message::Data { payload }),
            WireIn::ToolCall {
                correlation_id,
                name,
                arguments,
            } => {
                require_correlation_id(&correlation_id)?;
                Ok(Message::ToolCall(ToolCallRequest {
                    correlation_id,
                    name,
                    arguments,
                }))
            }
            WireIn::ToolResult {
                correlation_id,
                ok,
                value,
                error,
            } => {
                require_correlation_id(&correlation_id)?;
                let outcome = if ok {
                    Ok(value.unwrap_or(Value::Null))
                } else {
                    Err(error.ok_or_else(|| {
                        CodecError::Invalid("toolResult with ok=false requires an error".into())
                    })?)
                };
                Ok(Message::ToolResult(ToolCallResult {
                    correlation_id,
                    outcome,
                }))
            }
            WireIn::Error { detail } => Ok(Message::Error { detail }),
        }
    }
}

fn require_correlation_id(id: &str) -> Result<(), CodecError> {
    if id.is_empty() {
        return Err(CodecError::Invalid("correlationId must not be empty".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid frame: {0}")]
    Invalid(String),
}

/// Size-bounded JSON frame codec.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    max_frame_bytes: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Codec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Encode to a single newline-free line of compact JSON.
    pub fn encode(&self, message: &Message) -> Result<String, CodecError> {
        let frame = serde_json::to_string(&WireOut::from(message))
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        self.check_size(frame.len())?;
        Ok(frame)
    }

    pub fn decode(&self, frame: &str) -> Result<Message, CodecError> {
        self.check_size(frame.len())?;
        let wire: WireIn =
            serde_json::from_str(frame).map_err(|e| CodecError::Malformed(e.to_string()))?;
        Message::try_from(wire)
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_frame_bytes {
            return Err(CodecError::FrameTooLarge {
                size,
                limit: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}
