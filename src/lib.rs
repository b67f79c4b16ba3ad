//! Gateway library for CoE ("CAN over Ethernet") telemetry frames.
//!
//! CoE nodes broadcast 14 byte UDP frames carrying either four analogue
//! readings or a 16 bit digital map. coelink decodes those frames, keeps the
//! most recent ones in a bounded buffer, turns them into named values through
//! an external channel schema and reports what changed since the last look.
//!
//! # Features
//!
//! - **Codec**: decode received frames and build outbound ones ([`Frame`])
//! - **Buffering**: bounded FIFO of frames, persisted across restarts
//! - **Materialization**: per-node, per-channel values with units
//! - **Change detection**: per-consumer diffs with a periodic heartbeat
//! - **Front ends**: interactive shell and telnet command server
//! - **FHEM bridge**: changes forwarded as readings of a dummy device
//!
//! ## Example
//!
//! ```rust,no_run
//! use coelink::{ChannelKind, Gateway, UpdateRate};
//! use coelink::config::GatewayConfig;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> coelink::Result<()> {
//!     let gateway = Gateway::start(GatewayConfig::default()).await?;
//!     let mut changes = gateway.subscribe_changes(ChannelKind::Analogue, UpdateRate::Max(1));
//!
//!     while let Some(changes) = changes.next().await {
//!         println!("{}", serde_json::to_string(&changes).unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Data path
pub mod buffer;
pub mod diff;
pub mod materialize;
pub mod persist;
pub mod schema;

// Runtime
pub mod bridge;
pub mod config;
pub mod control;
pub mod driver;
pub mod gateway;
pub mod logging;
pub mod provider;
pub mod providers;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use bridge::FhemBridge;
pub use buffer::{FrameBuffer, FrameSnapshot};
pub use diff::{ChannelChange, Changes, DiffEngine};
pub use gateway::{ChangeStream, Gateway};
pub use materialize::{Materializer, RawValues, Values};
pub use schema::ChannelSchema;
