//! Core types for CoE frame representation.
//!
//! This module provides the codec layer: the [`Frame`] record itself, the
//! channel index arithmetic shared by reads and writes, and the small value
//! types decoded readings are made of.
//!
//! ## Architecture
//!
//! - [`Frame`] is one 14 byte record, decoded (immutable) or outbound (mutable)
//! - [`AnalogueReading`] / [`DigitalReading`] are single decoded channel values
//! - [`ChannelKind`] selects analogue or digital everywhere a caller must choose
//! - [`DigitalMask`] handles the 16 bit field of a digital frame
//! - [`UnitCode`] is the unit byte paired with every analogue value
//!
//! The codec never looks at channel schema, so any 14 byte input can be fed
//! through it without configuration.
//!
//! ## Usage Example
//!
//! ```rust
//! use coelink::types::{ChannelValue, Frame};
//!
//! let mut outbound = Frame::outbound();
//! outbound.set_channel_value(31, 10, ChannelValue::Analogue(67.8), 1).unwrap();
//!
//! let received = Frame::decode(outbound.as_bytes()).unwrap();
//! assert!(received.is_analogue());
//!
//! let reading = received.read_analogue(2).unwrap();
//! assert_eq!((reading.node, reading.index, reading.raw), (31, 10, 678));
//! ```

mod bitfield;
pub(crate) mod channel;
mod frame;
pub mod timestamp;
mod unit;
mod update_rate;

pub use bitfield::DigitalMask;
pub use channel::{
    ANALOGUE_FRAMES, ANALOGUE_SLOTS, AnalogueReading, ChannelKind, ChannelValue, DIGITAL_BITS,
    DigitalReading, HIGH_MAP, LOW_MAP, MAX_CHANNEL, MAX_OUTBOUND_ANALOGUE, analogue_global_index,
    analogue_slot_for, digital_bit_for,
};
pub use frame::{FRAME_LEN, Frame, MAX_DECIMALS, MAX_SELECTOR, raw_to_value, scale_to_raw};
pub use unit::{UnitCode, UnitInfo};
pub use update_rate::UpdateRate;
