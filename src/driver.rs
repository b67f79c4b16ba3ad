//! Driver spawns and manages the ingestion task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::FrameBuffer;
use crate::provider::Provider;
use crate::types::Frame;

/// Consecutive provider errors tolerated before the driver gives up and
/// cancels its token
pub const MAX_ERRORS: u32 = 10;

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Total frames ingested so far; changes on every append
    pub updates: watch::Receiver<u64>,
    /// Cancellation token for graceful shutdown; also cancelled by the task
    /// itself when the provider keeps failing
    pub cancel: CancellationToken,
    /// Ingestion task, finished once the provider ends or is cancelled
    pub task: JoinHandle<()>,
}

/// Driver spawns and manages the ingestion task
///
/// The task owns the provider, decodes every datagram into a [`Frame`] and
/// appends it to the shared buffer before bumping the watch counter, so a
/// woken reader always sees the frame that woke it.
pub struct Driver;

impl Driver {
    /// Spawn the ingestion task with a fresh cancellation token
    pub fn spawn<P>(provider: P, buffer: Arc<FrameBuffer>) -> DriverChannels
    where
        P: Provider,
    {
        Self::spawn_with_cancel(provider, buffer, CancellationToken::new())
    }

    /// Spawn the ingestion task tied to an existing token
    pub fn spawn_with_cancel<P>(
        provider: P,
        buffer: Arc<FrameBuffer>,
        cancel: CancellationToken,
    ) -> DriverChannels
    where
        P: Provider,
    {
        let (update_tx, update_rx) = watch::channel(0u64);
        let cancel_task = cancel.clone();

        let task = tokio::spawn(async move {
            Self::ingest_task(provider, buffer, update_tx, cancel_task).await;
        });

        DriverChannels { updates: update_rx, cancel, task }
    }

    async fn ingest_task<P>(
        mut provider: P,
        buffer: Arc<FrameBuffer>,
        update_tx: watch::Sender<u64>,
        cancel: CancellationToken,
    ) where
        P: Provider,
    {
        info!(source = %provider.source_name(), "Ingestion task started");
        let mut frame_count = 0u64;
        let mut dropped = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingestion cancelled");
                    break;
                }
                result = provider.next_datagram() => result,
            };

            match result {
                Ok(Some(datagram)) => {
                    error_count = 0;

                    let frame = match Frame::decode(&datagram) {
                        Ok(frame) => frame,
                        Err(e) => {
                            dropped += 1;
                            warn!("Dropping datagram: {}", e);
                            continue;
                        }
                    };

                    let (node, selector) = (frame.node(), frame.selector());
                    trace!(node, selector, "Frame {}", frame_count + 1);
                    buffer.append(frame);
                    frame_count += 1;

                    // Receivers may come and go; the counter is kept either way
                    update_tx.send_replace(frame_count);
                }
                Ok(None) => {
                    info!("Provider ended after {} frames", frame_count);
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Provider error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        // Everything sharing the token stops with us
                        error!("Too many provider errors, stopping ingestion and shutting down");
                        cancel.cancel();
                        break;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff(error_count)) => {}
                    }
                }
            }
        }

        debug!(dropped, "Ingestion task ended (ingested {} frames)", frame_count);
    }
}

/// Exponential backoff: 50ms, 100ms, 200ms, ... capped at 1.6s
fn backoff(error_count: u32) -> Duration {
    Duration::from_millis(50 * (1 << error_count.saturating_sub(1).min(5)))
}
