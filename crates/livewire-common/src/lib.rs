pub mod errors;
pub mod id;

pub use errors::{ConfigError, LivewireError};
pub use id::SessionId;

pub type Result<T> = std::result::Result<T, LivewireError>;
