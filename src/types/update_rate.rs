//! Update rate control for frame streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for frame streams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every frame the server sends
    Native,

    /// Throttled to maximum Hz
    /// A rate of zero is treated as Native
    Max(u32),
}

impl UpdateRate {
    /// Minimum spacing between emitted frames, if throttled
    pub fn throttle_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
