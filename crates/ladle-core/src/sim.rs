//! Simulation clock and state types.
//!
//! Time is a logical clock measured in whole seconds since midnight of the
//! simulation base day. The engine advances it by [`TICK_STEP`] after every
//! pipeline pass; nothing in the core reads the wall clock.

use crate::id::OrderNo;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Seconds since the start of the simulation base day.
pub type Ticks = u64;

/// Clock advance per engine step, in seconds.
pub const TICK_STEP: Ticks = 10;

/// Seconds per minute, for converting nominal leg durations.
pub const SECONDS_PER_MINUTE: Ticks = 60;

/// Errors from parsing a clock string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockParseError {
    #[error("expected HH:MM:SS, got '{0}'")]
    Malformed(String),
    #[error("clock component out of range in '{0}'")]
    OutOfRange(String),
}

/// Parse an `HH:MM:SS` string into seconds since midnight.
pub fn parse_clock(s: &str) -> Result<Ticks, ClockParseError> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(ClockParseError::Malformed(s.to_string()));
    }
    let mut values = [0u64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse::<u64>()
            .map_err(|_| ClockParseError::Malformed(s.to_string()))?;
    }
    let [h, m, sec] = values;
    if h > 23 || m > 59 || sec > 59 {
        return Err(ClockParseError::OutOfRange(s.to_string()));
    }
    Ok(h * 3600 + m * 60 + sec)
}

/// Render a clock value as `HH:MM:SS`. Values past one day keep counting hours.
pub fn format_clock(t: Ticks) -> String {
    format!("{:02}:{:02}:{:02}", t / 3600, (t / 60) % 60, t % 60)
}

/// Convert a nominal duration in minutes to ticks.
pub fn minutes(m: u32) -> Ticks {
    Ticks::from(m) * SECONDS_PER_MINUTE
}

// ---------------------------------------------------------------------------
// Step report
// ---------------------------------------------------------------------------

/// What happened during one `Engine::step()`. Purely informational.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Clock value the stages ran at (before the advance).
    pub clock: Ticks,
    /// Orders released by the dispatcher this step.
    pub released: Vec<OrderNo>,
    /// Number of legs generated by the split buffer.
    pub legs_generated: usize,
    /// Number of legs routed by the planner.
    pub legs_routed: usize,
    /// Number of legs the planner could not route this pass.
    pub routing_retries: usize,
    /// Number of segments handed to track queues.
    pub segments_allocated: usize,
    /// Number of legs the scanner marked completed.
    pub legs_completed: usize,
    /// Goods handed to the delivered archive.
    pub goods_delivered: usize,
    /// Track conflicts detected (no corrective action is taken).
    pub conflicts: usize,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for replay checks.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a u32 into the hash.
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed an i32 into the hash.
    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a string into the hash, length-prefixed.
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write(s.as_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
