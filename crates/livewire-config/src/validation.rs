//! Configuration validation.
//!
//! Every check pushes onto a shared list so one pass reports all problems
//! in a single `ConfigError`.

use crate::schema::LivewireConfig;
use livewire_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &LivewireConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_session(&mut errors, config);
    validate_reconnect(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

/// Push an error if `value` is outside `[min, max]`.
fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

fn validate_session(errors: &mut Vec<String>, config: &LivewireConfig) {
    let session = &config.session;

    let endpoint = session.endpoint.trim();
    if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
        errors.push(format!(
            "session.endpoint = {:?} must be a ws:// or wss:// URL",
            session.endpoint
        ));
    }

    validate_range(
        errors,
        "session.connect_timeout_secs",
        session.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "session.max_frame_bytes",
        session.max_frame_bytes,
        1024,
        64 * 1024 * 1024,
    );
    validate_range(
        errors,
        "session.tool_timeout_secs",
        session.tool_timeout_secs,
        1,
        3600,
    );
    validate_range(errors, "session.event_capacity", session.event_capacity, 1, 65536);
}

fn validate_reconnect(errors: &mut Vec<String>, config: &LivewireConfig) {
    let reconnect = &config.reconnect;
    validate_range(
        errors,
        "reconnect.base_delay_secs",
        reconnect.base_delay_secs,
        1,
        3600,
    );
    if reconnect.max_delay_secs < reconnect.base_delay_secs {
        errors.push(format!(
            "reconnect.max_delay_secs = {} must be >= reconnect.base_delay_secs = {}",
            reconnect.max_delay_secs, reconnect.base_delay_secs
        ));
    }
}
