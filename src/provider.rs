//! Provider trait for datagram sources

use crate::Result;

/// Trait for CoE datagram sources
///
/// Providers abstract over where frames come from (a UDP socket, a recorded
/// capture) and handle their own timing internally. The driver owns exactly
/// one provider and pulls from it in a loop.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Wait for the next datagram
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - a datagram arrived; it is not validated yet
    /// - `Ok(None)` - source exhausted (normal termination)
    /// - `Err(e)` - transport error, the driver retries with backoff
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>>;

    /// Human readable description of the source, used in logs
    fn source_name(&self) -> String;
}
