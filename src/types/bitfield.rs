//! Digital bitmask for the 16 channels of one digital frame

use serde::{Deserialize, Serialize};

/// The little-endian 16 bit field at bytes 2-3 of a digital frame.
///
/// Bits are numbered 1-16 here, matching the local channel numbers of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigitalMask(pub u16);

impl DigitalMask {
    /// Create a new mask from a raw u16 value.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Assemble the mask from its two wire bytes (low byte first).
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    /// Wire representation, low byte first.
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Check if local bit `bit` (1-16) is set.
    pub fn is_set(&self, bit: u8) -> bool {
        (self.0 & Self::flag(bit)) != 0
    }

    /// Set or clear local bit `bit` (1-16), leaving every other bit untouched.
    pub fn set(&mut self, bit: u8, value: bool) {
        if value {
            self.0 |= Self::flag(bit);
        } else {
            self.0 &= !Self::flag(bit);
        }
    }

    /// Get the raw u16 value.
    pub fn value(&self) -> u16 {
        self.0
    }

    fn flag(bit: u8) -> u16 {
        1 << ((u16::from(bit).wrapping_sub(1)) % 16)
    }
}
