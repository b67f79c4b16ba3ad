//! Channel kinds, readings and global index arithmetic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use super::UnitCode;
use crate::{CoeError, Result};

/// Number of analogue values carried by one analogue frame.
pub const ANALOGUE_SLOTS: u8 = 4;

/// Highest analogue frame number.
pub const ANALOGUE_FRAMES: u8 = 8;

/// Number of digital bits carried by one digital frame.
pub const DIGITAL_BITS: u8 = 16;

/// Highest global channel index for either kind.
pub const MAX_CHANNEL: u8 = 32;

/// Highest analogue index accepted when building outbound frames.
pub const MAX_OUTBOUND_ANALOGUE: u8 = 16;

/// Map selector for digital channels 1-16.
pub const LOW_MAP: u8 = 0;

/// Map selector for digital channels 17-32.
pub const HIGH_MAP: u8 = 0b1001;

/// The two kinds of channel a CoE frame can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Analogue,
    Digital,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Analogue => f.write_str("analogue"),
            ChannelKind::Digital => f.write_str("digital"),
        }
    }
}

/// Global analogue index for a slot of a given frame number.
///
/// `None` unless `frame` is in 1..=8 and `slot` in 1..=4.
pub fn analogue_global_index(frame: u8, slot: u8) -> Option<u8> {
    if !(1..=ANALOGUE_FRAMES).contains(&frame) || !(1..=ANALOGUE_SLOTS).contains(&slot) {
        return None;
    }
    Some((frame - 1) * ANALOGUE_SLOTS + slot)
}

/// Inverse of [`analogue_global_index`] for outbound frames: `(slot, frame)`.
pub fn analogue_slot_for(index: u8) -> Result<(u8, u8)> {
    if !(1..=MAX_OUTBOUND_ANALOGUE).contains(&index) {
        return Err(CoeError::index_out_of_range(
            "analogue index",
            index,
            1,
            MAX_OUTBOUND_ANALOGUE as usize,
        ));
    }
    let zero_based = index - 1;
    Ok((zero_based % ANALOGUE_SLOTS + 1, zero_based / ANALOGUE_SLOTS + 1))
}

/// Inverse digital mapping for outbound frames: `(bit, map selector)`.
pub fn digital_bit_for(index: u8) -> Result<(u8, u8)> {
    check_digital_index(index)?;
    let bit = (index - 1) % DIGITAL_BITS + 1;
    let map = if index < DIGITAL_BITS + 1 { LOW_MAP } else { HIGH_MAP };
    Ok((bit, map))
}

pub(crate) fn check_digital_index(index: u8) -> Result<()> {
    if !(1..=MAX_CHANNEL).contains(&index) {
        return Err(CoeError::index_out_of_range("digital index", index, 1, MAX_CHANNEL as usize));
    }
    Ok(())
}

/// One decoded analogue value, unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalogueReading {
    pub node: u8,
    pub index: u8,
    pub raw: u16,
    pub unit: UnitCode,
    #[serde(with = "super::timestamp")]
    pub timestamp: SystemTime,
}

/// One decoded digital value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitalReading {
    pub node: u8,
    pub index: u8,
    pub value: bool,
    #[serde(with = "super::timestamp")]
    pub timestamp: SystemTime,
}

/// A value to be written into an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    /// Engineering value, scaled by `10^decimals` on encode.
    Analogue(f64),
    Digital(bool),
}

impl ChannelValue {
    /// Which channel kind this value targets.
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelValue::Analogue(_) => ChannelKind::Analogue,
            ChannelValue::Digital(_) => ChannelKind::Digital,
        }
    }

    /// Coerce operator text into a value of the given kind.
    pub fn parse(kind: ChannelKind, text: &str) -> Result<Self> {
        let text = text.trim();
        match kind {
            ChannelKind::Analogue => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ChannelValue::Analogue)
                .ok_or_else(|| {
                    CoeError::parse_error("analogue value", format!("'{}' is not a number", text))
                }),
            ChannelKind::Digital => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Ok(ChannelValue::Digital(true)),
                "0" | "false" | "off" => Ok(ChannelValue::Digital(false)),
                _ => Err(CoeError::parse_error(
                    "digital value",
                    format!("'{}' is not a boolean value", text),
                )),
            },
        }
    }
}
