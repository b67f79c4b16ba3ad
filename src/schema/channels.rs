//! Per-node, per-channel metadata types

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::types::ChannelKind;

/// Channels of one node, keyed by global channel index.
pub type NodeChannels<C> = BTreeMap<u8, C>;

/// Channel metadata for every node, keyed by node number.
pub type NodeMap<C> = BTreeMap<u8, NodeChannels<C>>;

/// Metadata for one analogue channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogueChannel {
    #[serde(default)]
    pub name: String,
    /// Decimal places the raw magnitude is scaled by.
    #[serde(default, deserialize_with = "decimals_from_number_or_string")]
    pub decimals: u8,
    #[serde(default)]
    pub unit: String,
}

/// Metadata for one digital channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalChannel {
    #[serde(default)]
    pub name: String,
}

/// Externally configured metadata for analogue and digital channels.
///
/// Channels absent from the schema are still decoded but never materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSchema {
    #[serde(default)]
    pub analogue: NodeMap<AnalogueChannel>,
    #[serde(default)]
    pub digital: NodeMap<DigitalChannel>,
}

impl ChannelSchema {
    /// Create a schema from its two halves.
    pub fn new(analogue: NodeMap<AnalogueChannel>, digital: NodeMap<DigitalChannel>) -> Self {
        Self { analogue, digital }
    }

    /// Analogue channel metadata, if configured.
    pub fn analogue_channel(&self, node: u8, index: u8) -> Option<&AnalogueChannel> {
        self.analogue.get(&node)?.get(&index)
    }

    /// Digital channel metadata, if configured.
    pub fn digital_channel(&self, node: u8, index: u8) -> Option<&DigitalChannel> {
        self.digital.get(&node)?.get(&index)
    }

    /// Configured name with spaces replaced by underscores.
    ///
    /// This is the form used as a reading identifier by downstream bridges.
    pub fn reading_name(&self, kind: ChannelKind, node: u8, index: u8) -> Option<String> {
        let name = match kind {
            ChannelKind::Analogue => &self.analogue_channel(node, index)?.name,
            ChannelKind::Digital => &self.digital_channel(node, index)?.name,
        };
        if name.is_empty() { None } else { Some(name.replace(' ', "_")) }
    }

    /// Number of configured channels of one kind.
    pub fn channel_count(&self, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::Analogue => self.analogue.values().map(BTreeMap::len).sum(),
            ChannelKind::Digital => self.digital.values().map(BTreeMap::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.analogue.is_empty() && self.digital.is_empty()
    }
}

/// Schema documents written by hand carry decimals either as `1` or `"1"`.
fn decimals_from_number_or_string<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimals {
        Number(u8),
        Text(String),
    }

    match Decimals::deserialize(deserializer)? {
        Decimals::Number(n) => Ok(n),
        Decimals::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
