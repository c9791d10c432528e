//! Timing settings for task execution.
//!
//! All three knobs are wall-clock durations; call sites with known-slow
//! hardware override `check_timeout` per task. Settings deserialize from
//! a TOML table with humantime durations (`"500ms"`, `"2s"`), every field
//! defaulting independently.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Sleep between check polling rounds
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Per-device connection wait
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default check budget as a multiple of the debounce interval
pub const CHECK_TIMEOUT_FACTOR: u32 = 10;

/// Timing configuration shared by every task of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// How long a task waits for one device's channels to connect
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Sleep between check polling rounds (debounce, not busy-polling)
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Wall-clock budget of one check stage
    #[serde(with = "humantime_serde")]
    pub check_timeout: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
            check_timeout: DEFAULT_DEBOUNCE * CHECK_TIMEOUT_FACTOR,
        }
    }
}

impl TaskSettings {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Override the check budget for a slow device class.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Parse settings from a TOML table.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}
