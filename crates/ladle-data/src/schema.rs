//! Serde structs for the optional run file.
//!
//! Plant layout and order documents are defined in `ladle_core::config`;
//! this module only adds the settings of a headless run.

use crate::runner::RunLimits;
use ladle_core::sim::{ClockParseError, Ticks, parse_clock};
use serde::Deserialize;

fn default_grace() -> u64 {
    RunLimits::DEFAULT_GRACE
}

/// Contents of `run.{ron,toml,json}`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Clock to start from, `HH:MM:SS`. Defaults to midnight.
    pub start_clock: Option<String>,
    /// Seconds past the latest scheduled order end before the run gives up.
    #[serde(default = "default_grace")]
    pub grace_seconds: u64,
    /// Hard cap on engine steps.
    pub max_steps: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_clock: None,
            grace_seconds: RunLimits::DEFAULT_GRACE,
            max_steps: None,
        }
    }
}

impl RunConfig {
    pub fn start_clock(&self) -> Result<Option<Ticks>, ClockParseError> {
        self.start_clock.as_deref().map(parse_clock).transpose()
    }

    pub fn limits(&self) -> RunLimits {
        RunLimits {
            grace: self.grace_seconds,
            max_steps: self.max_steps,
        }
    }
}
