//! Replay provider for recorded datagrams

use std::collections::VecDeque;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::Result;
use crate::provider::Provider;
use crate::types::Frame;

/// Replays a fixed sequence of datagrams, optionally paced
pub struct ReplayProvider {
    datagrams: VecDeque<Vec<u8>>,

    /// Frame pacing; `None` replays as fast as the driver pulls
    interval: Option<Interval>,

    total: usize,
}

impl ReplayProvider {
    /// Replay raw datagrams, including malformed ones
    pub fn new<I>(datagrams: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let datagrams: VecDeque<Vec<u8>> = datagrams.into_iter().collect();
        let total = datagrams.len();
        debug!("Replay prepared with {} datagrams", total);
        Self { datagrams, interval: None, total }
    }

    /// Replay the wire bytes of already built frames
    pub fn from_frames<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        Self::new(frames.into_iter().map(|f| f.as_bytes().to_vec()))
    }

    /// Emit at most one datagram per `period`
    pub fn with_interval(mut self, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(ticker);
        self
    }

    /// Datagrams not yet handed out
    pub fn remaining(&self) -> usize {
        self.datagrams.len()
    }
}

#[async_trait::async_trait]
impl Provider for ReplayProvider {
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        if self.datagrams.is_empty() {
            debug!("Reached end of replay");
            return Ok(None);
        }

        if let Some(ticker) = self.interval.as_mut() {
            ticker.tick().await;
        }

        let datagram = self.datagrams.pop_front();
        trace!("Datagram {}/{}", self.total - self.datagrams.len(), self.total);
        Ok(datagram)
    }

    fn source_name(&self) -> String {
        format!("replay ({} datagrams)", self.total)
    }
}
