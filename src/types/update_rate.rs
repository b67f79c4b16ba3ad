//! Update rate control for change subscriptions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a change subscription may wake up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Wake on every ingested frame
    Native,

    /// Wake at most this many times per second, coalescing bursts
    Max(u32),
}

impl UpdateRate {
    /// Normalize a rate: `Max(0)` means "no limit"
    pub fn normalize(self) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            other => other,
        }
    }

    /// Check if throttling is needed
    pub fn needs_throttle(self) -> bool {
        matches!(self.normalize(), UpdateRate::Max(_))
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self) -> Option<Duration> {
        match self.normalize() {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

impl Default for UpdateRate {
    /// One wake-up per second, the pace a remote bridge is fed at
    fn default() -> Self {
        UpdateRate::Max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hz_means_unthrottled() {
        assert_eq!(UpdateRate::Max(0).normalize(), UpdateRate::Native);
        assert!(!UpdateRate::Max(0).needs_throttle());
        assert_eq!(UpdateRate::Native.throttle_interval(), None);
    }

    #[test]
    fn throttle_interval_from_hz() {
        assert_eq!(UpdateRate::Max(4).throttle_interval(), Some(Duration::from_millis(250)));
        assert_eq!(UpdateRate::default().throttle_interval(), Some(Duration::from_secs(1)));
    }
}
