//! Exponential backoff between session attempts.

use std::time::Duration;

use livewire_config::ReconnectConfig;

/// Delay schedule: `base`, doubling up to `max`, reset after a session opens.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    /// Consecutive failed attempts since the last successful open.
    failures: u32,
    /// 0 means unlimited.
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            failures: 0,
            max_attempts,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_secs(u64::from(config.base_delay_secs)),
            Duration::from_secs(u64::from(config.max_delay_secs)),
            config.max_attempts,
        )
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.max_attempts != 0 && self.failures > self.max_attempts {
            return None;
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        Some(delay)
    }

    /// A session reached `Open`.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
