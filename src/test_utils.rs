//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Frame builders go through the public encoder and back through the decoder
//! so the frames they return look exactly like received ones.

#![cfg(any(test, feature = "benchmark"))]

use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::provider::Provider;
use crate::schema::{AnalogueChannel, ChannelSchema, DigitalChannel, NodeMap};
use crate::types::{ChannelValue, Frame};
use crate::{CoeError, Result};

/// Received analogue frame carrying one scaled value.
///
/// Panics on out-of-range arguments; callers pass fixed test data.
pub fn analogue_frame(node: u8, index: u8, value: f64, decimals: u8) -> Frame {
    received(node, &[(index, ChannelValue::Analogue(value))], decimals)
}

/// Received digital frame carrying one bit.
pub fn digital_frame(node: u8, index: u8, value: bool) -> Frame {
    received(node, &[(index, ChannelValue::Digital(value))], 0)
}

/// Received frame carrying several channels of the same frame/map.
pub fn received(node: u8, values: &[(u8, ChannelValue)], decimals: u8) -> Frame {
    let mut frame = Frame::outbound();
    for (index, value) in values {
        if let Err(e) = frame.set_channel_value(node, *index, *value, decimals) {
            panic!("invalid test frame (node {}, index {}): {}", node, index, e);
        }
    }
    match Frame::decode(frame.as_bytes()) {
        Ok(frame) => frame,
        Err(e) => panic!("fourteen bytes always decode: {}", e),
    }
}

/// Schema used across tests:
/// - node 31: analogue 9 "collector", 10 "buffer top" (1 decimal, °C),
///   16 "pressure" (2 decimals, Bar)
/// - node 21: digital 3 "valve", 21 "pump"
pub fn sample_schema() -> ChannelSchema {
    let mut analogue = NodeMap::new();
    let node31 = analogue.entry(31).or_insert_with(Default::default);
    let channel = |name: &str, decimals, unit: &str| AnalogueChannel {
        name: name.into(),
        decimals,
        unit: unit.into(),
    };
    node31.insert(9, channel("collector", 1, "°C"));
    node31.insert(10, channel("buffer top", 1, "°C"));
    node31.insert(16, channel("pressure", 2, "Bar"));

    let mut digital = NodeMap::new();
    let node21 = digital.entry(21).or_insert_with(Default::default);
    node21.insert(3, DigitalChannel { name: "valve".into() });
    node21.insert(21, DigitalChannel { name: "pump".into() });

    ChannelSchema::new(analogue, digital)
}

/// Per-test scratch directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("coelink-test-{}-{}", tag, std::process::id()));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("cannot create scratch dir {}: {}", dir.display(), e);
    }
    dir
}

/// Config bound to loopback on an ephemeral port, with its dump in a scratch
/// directory and no interactive front ends.
pub fn scratch_config(tag: &str) -> GatewayConfig {
    let dir = scratch_dir(tag);
    let _ = std::fs::remove_file(dir.join("coelink.dump"));

    let mut config = GatewayConfig::default();
    config.listen = ([127, 0, 0, 1], 0).into();
    config.dump_path = dir.join("coelink.dump");
    config.schema.analogue = dir.join("config_analogue.json");
    config.schema.digital = dir.join("config_digital.json");
    config.control.shell = false;
    config
}

/// Provider fed by the test through a channel; ends when the sender drops.
pub struct ChannelProvider {
    datagrams: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// A [`ChannelProvider`] and the sender that feeds it.
pub fn channel_provider() -> (mpsc::UnboundedSender<Vec<u8>>, ChannelProvider) {
    let (tx, datagrams) = mpsc::unbounded_channel();
    (tx, ChannelProvider { datagrams })
}

#[async_trait::async_trait]
impl Provider for ChannelProvider {
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.datagrams.recv().await)
    }

    fn source_name(&self) -> String {
        "test channel".into()
    }
}

/// Provider whose socket is permanently broken.
pub struct FailingProvider;

#[async_trait::async_trait]
impl Provider for FailingProvider {
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        Err(CoeError::transport_failed("socket gone"))
    }

    fn source_name(&self) -> String {
        "failing".into()
    }
}
