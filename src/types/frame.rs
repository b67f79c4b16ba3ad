//! CoE frame codec
//!
//! Wire layout of the 14 byte record (multi-byte fields little-endian):
//!
//! ```text
//! analogue: [node|1][frame 1-8|1][value 1-4|2 each][unit 1-4|1 each]
//! digital:  [node|1][map 0x0/0x9|1][bits 1-16|2][unused|10]
//! ```
//!
//! A [`Frame`] is either decoded from a received buffer (immutable) or built
//! for transmission with [`Frame::outbound`] (mutable). Both share one type;
//! the capability is a flag checked by every write.

use std::fmt;
use std::time::SystemTime;

use super::channel::{
    ANALOGUE_FRAMES, ANALOGUE_SLOTS, AnalogueReading, ChannelKind, ChannelValue, DIGITAL_BITS,
    DigitalReading, HIGH_MAP, analogue_global_index, analogue_slot_for, check_digital_index,
    digital_bit_for,
};
use super::{DigitalMask, UnitCode, timestamp};
use crate::{CoeError, Result};

/// Length of every CoE frame on the wire.
pub const FRAME_LEN: usize = 14;

/// Highest value accepted for byte 1.
pub const MAX_SELECTOR: u8 = 9;

/// Highest number of decimals accepted for outbound analogue values.
pub const MAX_DECIMALS: u8 = 2;

/// One 14 byte CoE record plus the time it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: [u8; FRAME_LEN],
    timestamp: SystemTime,
    mutable: bool,
    modified: bool,
}

impl Frame {
    /// Decode a received buffer. The resulting frame is immutable.
    ///
    /// Any 14 byte pattern is accepted; whether it is analogue or digital is
    /// decided lazily by [`Frame::is_analogue`].
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let data: [u8; FRAME_LEN] =
            buffer.try_into().map_err(|_| CoeError::MalformedFrame { len: buffer.len() })?;
        Ok(Self { data, timestamp: SystemTime::now(), mutable: false, modified: false })
    }

    /// Create a zero-filled frame for transmission.
    pub fn outbound() -> Self {
        Self { data: [0; FRAME_LEN], timestamp: SystemTime::now(), mutable: true, modified: false }
    }

    /// Rebuild an immutable frame from a persisted record, keeping its timestamp.
    pub fn restored(data: [u8; FRAME_LEN], timestamp: SystemTime) -> Self {
        Self { data, timestamp, mutable: false, modified: false }
    }

    /// Node number (byte 0).
    pub fn node(&self) -> u8 {
        self.data[0]
    }

    /// Frame number for analogue frames, map selector for digital ones (byte 1).
    pub fn selector(&self) -> u8 {
        self.data[1]
    }

    /// Analogue frames carry a frame number between 1 and 8.
    pub fn is_analogue(&self) -> bool {
        (1..=ANALOGUE_FRAMES).contains(&self.data[1])
    }

    /// Everything that is not analogue is digital.
    pub fn is_digital(&self) -> bool {
        !self.is_analogue()
    }

    /// Channel kind decided by the selector byte.
    pub fn kind(&self) -> ChannelKind {
        if self.is_analogue() { ChannelKind::Analogue } else { ChannelKind::Digital }
    }

    /// Digital frames for channels 17-32 carry the high map selector.
    pub fn is_high_map(&self) -> bool {
        self.data[1] == HIGH_MAP
    }

    /// True iff every byte is zero.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// True once the selector of a mutable frame has been written.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.data
    }

    /// The digital bit field at bytes 2-3.
    pub fn digital_mask(&self) -> DigitalMask {
        DigitalMask::from_le_bytes([self.data[2], self.data[3]])
    }

    /// Read analogue slot 1-4 without scaling.
    pub fn read_analogue(&self, slot: u8) -> Result<AnalogueReading> {
        check_slot(slot)?;
        // Only frame numbers 1-8 have a global index
        let selector = self.selector();
        let index = analogue_global_index(selector, slot).ok_or(CoeError::WrongFrameKind {
            expected: ChannelKind::Analogue,
            selector,
        })?;

        let offset = usize::from(slot) * 2;
        Ok(AnalogueReading {
            node: self.node(),
            index,
            raw: u16::from_le_bytes([self.data[offset], self.data[offset + 1]]),
            unit: UnitCode(self.data[9 + usize::from(slot)]),
            timestamp: self.timestamp,
        })
    }

    /// Read digital channel `index` (1-32).
    ///
    /// The returned index reflects the map this frame carries: asking a high
    /// map frame for index 5 yields index 21, and vice versa.
    pub fn read_digital(&self, index: u8) -> Result<DigitalReading> {
        check_digital_index(index)?;

        let bit = (index - 1) % DIGITAL_BITS + 1;
        let remapped = if self.is_high_map() { bit + DIGITAL_BITS } else { bit };

        Ok(DigitalReading {
            node: self.node(),
            index: remapped,
            value: self.digital_mask().is_set(bit),
            timestamp: self.timestamp,
        })
    }

    /// Write an unscaled magnitude into slot 1-4 with the default unit.
    pub fn encode_analogue(&mut self, slot: u8, raw: u32) -> Result<()> {
        self.encode_analogue_with_unit(slot, raw, UnitCode::default())
    }

    /// Write an unscaled magnitude and its unit code into slot 1-4.
    pub fn encode_analogue_with_unit(&mut self, slot: u8, raw: u32, unit: UnitCode) -> Result<()> {
        self.ensure_mutable()?;
        check_slot(slot)?;
        let raw = u16::try_from(raw).map_err(|_| {
            CoeError::value_out_of_range("raw magnitude", format!("{} exceeds 65535", raw))
        })?;

        let offset = usize::from(slot) * 2;
        self.data[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
        self.data[9 + usize::from(slot)] = unit.code();
        Ok(())
    }

    /// Set or clear local bit 1-16, leaving all other bits untouched.
    pub fn encode_digital_bit(&mut self, bit: u8, value: bool) -> Result<()> {
        self.ensure_mutable()?;
        if !(1..=DIGITAL_BITS).contains(&bit) {
            return Err(CoeError::index_out_of_range(
                "digital bit",
                bit,
                1,
                DIGITAL_BITS as usize,
            ));
        }

        let mut mask = self.digital_mask();
        mask.set(bit, value);
        self.data[2..4].copy_from_slice(&mask.to_le_bytes());
        Ok(())
    }

    /// Set the frame number / map selector (0-9).
    ///
    /// The first successful call pins the selector; later calls must agree.
    pub fn set_selector(&mut self, value: u8) -> Result<()> {
        self.ensure_mutable()?;
        self.check_selector(value)?;

        self.data[1] = value;
        self.modified = true;
        Ok(())
    }

    /// Set the node byte. A non-zero node cannot be replaced by another one.
    pub fn set_node(&mut self, node: u8) -> Result<()> {
        self.ensure_mutable()?;
        self.check_node(node)?;

        self.data[0] = node;
        Ok(())
    }

    /// Write one channel value for `node` at global `index`.
    ///
    /// Analogue indexes are 1-16 with 0-2 decimals; the raw magnitude is
    /// `round(value * 10^decimals)` and must fit into 16 bits. Digital indexes
    /// are 1-32 and `decimals` is ignored. Several channels sharing a frame
    /// number (or map) can be written into the same frame.
    ///
    /// Nothing is written unless every check passes.
    pub fn set_channel_value(
        &mut self,
        node: u8,
        index: u8,
        value: ChannelValue,
        decimals: u8,
    ) -> Result<()> {
        self.ensure_mutable()?;

        match value {
            ChannelValue::Analogue(value) => {
                let (slot, frame) = analogue_slot_for(index)?;
                let raw = scale_to_raw(value, decimals)?;
                self.check_node(node)?;
                self.check_selector(frame)?;

                self.set_node(node)?;
                self.set_selector(frame)?;
                self.encode_analogue(slot, raw)
            }
            ChannelValue::Digital(value) => {
                let (bit, map) = digital_bit_for(index)?;
                self.check_node(node)?;
                self.check_selector(map)?;

                self.set_node(node)?;
                self.set_selector(map)?;
                self.encode_digital_bit(bit, value)
            }
        }
    }

    /// Verbose rendering with creation time and every byte in hex and decimal.
    pub fn verbose(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = format!("{:.3} ", timestamp::to_unix_seconds(self.timestamp));
        for (i, byte) in self.data.iter().enumerate() {
            out.push_str(&format!("[b{}:{:02x}h|{:03}d] ", i, byte, byte));
        }
        out
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.mutable { Ok(()) } else { Err(CoeError::NotMutable) }
    }

    fn check_node(&self, node: u8) -> Result<()> {
        let current = self.data[0];
        if current != 0 && current != node {
            return Err(CoeError::ConflictingNode { current, requested: node });
        }
        Ok(())
    }

    fn check_selector(&self, value: u8) -> Result<()> {
        if value > MAX_SELECTOR {
            return Err(CoeError::value_out_of_range(
                "frame selector",
                format!("{} is not between 0 and {}", value, MAX_SELECTOR),
            ));
        }
        if self.modified && self.data[1] != value {
            let current = self.data[1];
            return Err(CoeError::ConflictingFrameNumber { current, requested: value });
        }
        Ok(())
    }
}

impl fmt::Display for Frame {
    /// Compact hex rendering; empty frames render as nothing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        for byte in &self.data {
            write!(f, "[{:02x}h]", byte)?;
        }
        Ok(())
    }
}

fn check_slot(slot: u8) -> Result<()> {
    if !(1..=ANALOGUE_SLOTS).contains(&slot) {
        return Err(CoeError::index_out_of_range("analogue slot", slot, 1, ANALOGUE_SLOTS as usize));
    }
    Ok(())
}

/// Scale an engineering value into the 16 bit raw magnitude.
pub fn scale_to_raw(value: f64, decimals: u8) -> Result<u32> {
    if decimals > MAX_DECIMALS {
        return Err(CoeError::value_out_of_range(
            "decimals",
            format!("{} is not between 0 and {}", decimals, MAX_DECIMALS),
        ));
    }

    let scaled = (value * 10f64.powi(i32::from(decimals))).round();
    if !scaled.is_finite() || !(0.0..=f64::from(u16::MAX)).contains(&scaled) {
        return Err(CoeError::value_out_of_range(
            "analogue value",
            format!("{} with {} decimals does not fit into 0-65535", value, decimals),
        ));
    }
    Ok(scaled as u32)
}

/// Scale a raw magnitude back into an engineering value.
pub fn raw_to_value(raw: u16, decimals: u8) -> f64 {
    f64::from(raw) / 10f64.powi(i32::from(decimals))
}
