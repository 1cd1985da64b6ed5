//! Common types for the metro environment abstraction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One discrete simulation step, as delivered to every subscriber.
///
/// All subscribers that had room in their inbox observe the same value
/// for a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,

    /// Scheduler time at which the tick fired, relative to the ticker's creation
    pub at: Duration,
}

/// Lifecycle state of a [`crate::Ticker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerState {
    /// Terminal. No further ticks are delivered.
    Stopped,

    /// The clock is running and ticks are fanned out.
    Running,

    /// The clock is halted; subscriptions are kept.
    Paused,
}

impl TickerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            TickerState::Stopped => 0,
            TickerState::Running => 1,
            TickerState::Paused => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TickerState::Running,
            2 => TickerState::Paused,
            _ => TickerState::Stopped,
        }
    }
}

impl std::fmt::Display for TickerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TickerState::Stopped => "stopped",
            TickerState::Running => "running",
            TickerState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for TickerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" | "1" => Ok(TickerState::Running),
            "paused" | "2" => Ok(TickerState::Paused),
            "stopped" | "0" => Ok(TickerState::Stopped),
            _ => Err(format!("Unknown ticker state: {}", s)),
        }
    }
}
