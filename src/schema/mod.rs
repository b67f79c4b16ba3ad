//! Channel schema: names, decimals and units per node and channel
//!
//! The schema is external configuration. It never influences decoding; it
//! only decides which decoded channels are materialized and how raw
//! magnitudes are scaled for display.

mod channels;
mod loader;

pub use channels::{AnalogueChannel, ChannelSchema, DigitalChannel, NodeChannels, NodeMap};
pub use loader::SchemaFormat;
