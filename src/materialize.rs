//! Value materialization: frames + schema → typed snapshots
//!
//! A snapshot starts as an owned copy of the schema and is overlaid with the
//! readings of every matching frame, oldest first. The last frame applied for
//! a (node, index) pair wins, so buffer order is the only recency rule.
//! Channels no frame has reported keep only their schema fields.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::SystemTime;

use crate::buffer::FrameSnapshot;
use crate::schema::{AnalogueChannel, ChannelSchema, DigitalChannel};
use crate::types::{
    ANALOGUE_SLOTS, AnalogueReading, ChannelKind, DIGITAL_BITS, DigitalReading, raw_to_value,
};

/// Node → channel index → entry.
pub type Snapshot<E> = BTreeMap<u8, BTreeMap<u8, E>>;

/// Node → channel index → decoded reading, independent of schema.
pub type RawSnapshot<R> = BTreeMap<u8, BTreeMap<u8, R>>;

/// A materialized channel whose observed value can be compared across snapshots.
pub trait ChannelEntry: Clone + Debug + Send + 'static {
    /// Observed value type.
    type Value: PartialEq + Clone + Debug + Serialize + Send + 'static;

    /// Kind of channel this entry describes.
    const KIND: ChannelKind;

    /// `None` until a frame has reported this channel.
    fn value(&self) -> Option<&Self::Value>;
}

/// Analogue channel: schema fields plus the latest reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogueEntry {
    pub name: String,
    pub decimals: u8,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "value_unit", skip_serializing_if = "Option::is_none")]
    pub value_with_unit: Option<String>,
    #[serde(with = "crate::types::timestamp::option", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
}

impl From<&AnalogueChannel> for AnalogueEntry {
    fn from(channel: &AnalogueChannel) -> Self {
        Self {
            name: channel.name.clone(),
            decimals: channel.decimals,
            unit: channel.unit.clone(),
            raw: None,
            value: None,
            value_with_unit: None,
            timestamp: None,
        }
    }
}

impl AnalogueEntry {
    /// Overlay a decoded reading, scaling by the configured decimals.
    pub fn observe(&mut self, reading: &AnalogueReading) {
        let value = raw_to_value(reading.raw, self.decimals);
        self.raw = Some(reading.raw);
        self.value = Some(value);
        // Debug keeps the decimal point of whole numbers: "52.0 °C"
        self.value_with_unit = Some(format!("{:?} {}", value, self.unit));
        self.timestamp = Some(reading.timestamp);
    }
}

impl ChannelEntry for AnalogueEntry {
    type Value = f64;
    const KIND: ChannelKind = ChannelKind::Analogue;

    fn value(&self) -> Option<&f64> {
        self.value.as_ref()
    }
}

/// Digital channel: schema fields plus the latest reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigitalEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    #[serde(with = "crate::types::timestamp::option", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
}

impl From<&DigitalChannel> for DigitalEntry {
    fn from(channel: &DigitalChannel) -> Self {
        Self { name: channel.name.clone(), value: None, timestamp: None }
    }
}

impl DigitalEntry {
    pub fn observe(&mut self, reading: &DigitalReading) {
        self.value = Some(reading.value);
        self.timestamp = Some(reading.timestamp);
    }
}

impl ChannelEntry for DigitalEntry {
    type Value = bool;
    const KIND: ChannelKind = ChannelKind::Digital;

    fn value(&self) -> Option<&bool> {
        self.value.as_ref()
    }
}

/// Snapshot of either kind, rendered as its bare node map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Values {
    Analogue(Snapshot<AnalogueEntry>),
    Digital(Snapshot<DigitalEntry>),
}

/// Schema-independent readings of either kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValues {
    Analogue(RawSnapshot<AnalogueReading>),
    Digital(RawSnapshot<DigitalReading>),
}

/// Builds snapshots from buffered frames against one channel schema.
#[derive(Debug, Clone, Default)]
pub struct Materializer {
    schema: Arc<ChannelSchema>,
}

impl Materializer {
    pub fn new(schema: Arc<ChannelSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ChannelSchema {
        &self.schema
    }

    /// Snapshot of the requested kind.
    pub fn snapshot(&self, kind: ChannelKind, frames: &FrameSnapshot) -> Values {
        match kind {
            ChannelKind::Analogue => Values::Analogue(self.analogue(frames)),
            ChannelKind::Digital => Values::Digital(self.digital(frames)),
        }
    }

    /// Analogue snapshot; `value = raw / 10^decimals`.
    pub fn analogue(&self, frames: &FrameSnapshot) -> Snapshot<AnalogueEntry> {
        let mut snapshot: Snapshot<AnalogueEntry> = skeleton(&self.schema.analogue);

        for frame in frames.iter().filter(|f| f.is_analogue()) {
            let Some(channels) = snapshot.get_mut(&frame.node()) else {
                continue;
            };
            for slot in 1..=ANALOGUE_SLOTS {
                let Ok(reading) = frame.read_analogue(slot) else {
                    continue;
                };
                if let Some(entry) = channels.get_mut(&reading.index) {
                    entry.observe(&reading);
                }
            }
        }
        snapshot
    }

    /// Digital snapshot; a frame only touches the 16 channels of its map.
    pub fn digital(&self, frames: &FrameSnapshot) -> Snapshot<DigitalEntry> {
        let mut snapshot: Snapshot<DigitalEntry> = skeleton(&self.schema.digital);

        for frame in frames.iter().filter(|f| f.is_digital()) {
            let Some(channels) = snapshot.get_mut(&frame.node()) else {
                continue;
            };
            for bit in 1..=DIGITAL_BITS {
                let Ok(reading) = frame.read_digital(bit) else {
                    continue;
                };
                if let Some(entry) = channels.get_mut(&reading.index) {
                    entry.observe(&reading);
                }
            }
        }
        snapshot
    }
}

/// Every decoded reading of the requested kind, later frames winning.
pub fn raw_values(kind: ChannelKind, frames: &FrameSnapshot) -> RawValues {
    match kind {
        ChannelKind::Analogue => RawValues::Analogue(raw_analogue(frames)),
        ChannelKind::Digital => RawValues::Digital(raw_digital(frames)),
    }
}

pub fn raw_analogue(frames: &FrameSnapshot) -> RawSnapshot<AnalogueReading> {
    let mut raw = RawSnapshot::new();
    for frame in frames.iter().filter(|f| f.is_analogue()) {
        let node = raw.entry(frame.node()).or_insert_with(BTreeMap::new);
        for reading in (1..=ANALOGUE_SLOTS).filter_map(|slot| frame.read_analogue(slot).ok()) {
            node.insert(reading.index, reading);
        }
    }
    raw
}

pub fn raw_digital(frames: &FrameSnapshot) -> RawSnapshot<DigitalReading> {
    let mut raw = RawSnapshot::new();
    for frame in frames.iter().filter(|f| f.is_digital()) {
        let node = raw.entry(frame.node()).or_insert_with(BTreeMap::new);
        for reading in (1..=DIGITAL_BITS).filter_map(|bit| frame.read_digital(bit).ok()) {
            node.insert(reading.index, reading);
        }
    }
    raw
}

fn skeleton<C, E>(schema: &BTreeMap<u8, BTreeMap<u8, C>>) -> Snapshot<E>
where
    for<'a> E: From<&'a C>,
{
    schema
        .iter()
        .map(|(node, channels)| {
            (*node, channels.iter().map(|(index, channel)| (*index, E::from(channel))).collect())
        })
        .collect()
}
