//! Callback slots. One handler per event; setting one replaces the previous.
//!
//! Handlers run on the session's event loop. A panicking handler is logged
//! and otherwise ignored so the loop keeps running.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::error::SessionError;
use crate::protocol::Message;
use crate::transport::CloseInfo;

use super::types::SessionEvent;

pub(crate) type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default, Clone)]
pub(crate) struct Handlers {
    pub(crate) on_open: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) on_message: Option<Callback<Message>>,
    pub(crate) on_error: Option<Callback<SessionError>>,
    pub(crate) on_close: Option<Callback<CloseInfo>>,
}

impl Handlers {
    /// Invoke the handler matching `event`, if one is set.
    pub(crate) fn fire(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Opened => {
                if let Some(f) = &self.on_open {
                    guarded("on_open", || f());
                }
            }
            SessionEvent::Message(message) => {
                if let Some(f) = &self.on_message {
                    guarded("on_message", || f(message.clone()));
                }
            }
            SessionEvent::Error(error) => {
                if let Some(f) = &self.on_error {
                    guarded("on_error", || f(error.clone()));
                }
            }
            SessionEvent::Closed(info) => {
                if let Some(f) = &self.on_close {
                    guarded("on_close", || f(info.clone()));
                }
            }
        }
    }
}

fn guarded(handler: &'static str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(handler, panic = %panic_message(panic.as_ref()), "Session handler panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
