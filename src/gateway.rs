//! Gateway: the component graph behind every front end
//!
//! A gateway owns the frame buffer, the materializer built from the channel
//! schema, its own diff engine and the dump file, plus the background tasks
//! (ingestion and periodic saving) that feed and persist them. Front ends call
//! the query methods; nothing here formats output.

use futures::{Stream, StreamExt, future};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::buffer::FrameBuffer;
use crate::config::GatewayConfig;
use crate::diff::{Changes, DiffEngine};
use crate::driver::Driver;
use crate::materialize::{Materializer, RawValues, Values, raw_values};
use crate::persist::FrameStore;
use crate::provider::Provider;
use crate::providers::{FrameSender, UdpProvider};
use crate::schema::ChannelSchema;
use crate::stream::ThrottleExt;
use crate::types::{ChannelKind, ChannelValue, Frame, UpdateRate};
use crate::{CoeError, Result};

/// Stream of non-empty change lists for one subscriber.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Changes> + Send>>;

/// Running CoE gateway.
pub struct Gateway {
    config: GatewayConfig,
    buffer: Arc<FrameBuffer>,
    materializer: Materializer,
    diff: Mutex<DiffEngine>,
    store: FrameStore,
    updates: watch::Receiver<u64>,
    /// Bumped by every clean so subscribers drop their diff history too
    cleans: watch::Sender<u64>,
    cancel: CancellationToken,
    sender: Option<FrameSender>,
    local_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Build the component graph without touching the network or disk.
    ///
    /// Nothing is ingested; subscriptions end after their baseline.
    pub fn new(config: GatewayConfig, schema: ChannelSchema) -> Self {
        let (_, updates) = watch::channel(0);
        let (cleans, _) = watch::channel(0);
        Self {
            buffer: Arc::new(FrameBuffer::new(config.fifo_length)),
            materializer: Materializer::new(Arc::new(schema)),
            diff: Mutex::new(DiffEngine::new(config.renew())),
            store: FrameStore::new(&config.dump_path),
            updates,
            cleans,
            cancel: CancellationToken::new(),
            sender: None,
            local_addr: None,
            tasks: Vec::new(),
            config,
        }
    }

    /// Load the schema, restore the dump and start listening on `config.listen`.
    pub async fn start(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let schema = ChannelSchema::load(&config.schema.analogue, &config.schema.digital)?;
        let provider = UdpProvider::bind(config.listen).await?;
        let local_addr = provider.local_addr();

        let mut gateway = Self::with_provider(config, schema, provider).await?;
        gateway.local_addr = Some(local_addr);
        Ok(gateway)
    }

    /// Same as [`start`](Self::start) with an arbitrary frame source.
    pub async fn with_provider<P>(
        config: GatewayConfig,
        schema: ChannelSchema,
        provider: P,
    ) -> Result<Self>
    where
        P: Provider,
    {
        config.validate()?;
        let mut gateway = Self::new(config, schema);

        // An unreadable dump must not keep the gateway from starting
        if let Err(e) = gateway.restore() {
            error!("Failed to restore frames: {}", e);
        }

        if let Some(target) = gateway.config.send_to {
            gateway.sender = Some(FrameSender::connect(target).await?);
        }

        let buffer = Arc::clone(&gateway.buffer);
        let channels = Driver::spawn_with_cancel(provider, buffer, gateway.cancel.clone());
        gateway.updates = channels.updates;
        gateway.tasks.push(channels.task);

        if let Some(period) = gateway.config.save_interval() {
            gateway.tasks.push(spawn_persistence(
                Arc::clone(&gateway.buffer),
                gateway.store.clone(),
                period,
                gateway.cancel.clone(),
            ));
        }

        info!(
            fifo_length = gateway.buffer.capacity(),
            frames = gateway.buffer.len(),
            "Gateway started"
        );
        Ok(gateway)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn schema(&self) -> &ChannelSchema {
        self.materializer.schema()
    }

    /// Bound UDP address when started with [`start`](Self::start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Materialized values of one kind.
    pub fn values(&self, kind: ChannelKind) -> Values {
        self.materializer.snapshot(kind, &self.buffer.snapshot())
    }

    /// Every decoded reading of one kind, ignoring the schema.
    pub fn raw_values(&self, kind: ChannelKind) -> RawValues {
        raw_values(kind, &self.buffer.snapshot())
    }

    /// Changes since the previous call for this kind on the gateway's shared engine.
    pub fn difference(&self, kind: ChannelKind) -> Changes {
        let frames = self.buffer.snapshot();
        self.diff_engine().diff(kind, &self.materializer, &frames)
    }

    /// Buffered frames, newest first.
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.buffer.snapshot().frames().iter().rev().cloned().collect()
    }

    pub fn last_frame(&self) -> Option<Arc<Frame>> {
        self.buffer.last()
    }

    pub fn frame_count(&self) -> usize {
        self.buffer.len()
    }

    /// Drop every frame, forget diff history and save the empty dump.
    ///
    /// Subscriptions forget their history as well and take a new baseline on
    /// their next wake-up.
    pub fn clean(&self) -> Result<()> {
        self.buffer.clear();
        self.diff_engine().reset_baseline();
        self.cleans.send_modify(|generation| *generation += 1);
        self.store.save(&self.buffer)?;
        info!("Frames cleaned");
        Ok(())
    }

    /// Write the buffer to the dump file. Returns the number of frames saved.
    pub fn save(&self) -> Result<usize> {
        self.store.save(&self.buffer)
    }

    /// Replace the buffer with the dump file. Returns the number of frames restored.
    pub fn restore(&self) -> Result<usize> {
        self.store.restore(&self.buffer)
    }

    /// Transmit a frame to `send_to`.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| CoeError::Config { reason: "send_to is not configured".into() })?;
        sender.send(frame).await
    }

    /// Build an outbound frame for one channel and transmit it.
    pub async fn send_value(
        &self,
        node: u8,
        index: u8,
        value: ChannelValue,
        decimals: u8,
    ) -> Result<Frame> {
        let mut frame = Frame::outbound();
        frame.set_channel_value(node, index, value, decimals)?;
        self.send(&frame).await?;
        Ok(frame)
    }

    /// Stream of changes for one kind, woken by ingestion and limited by `rate`.
    ///
    /// Each subscription diffs with its own engine, starting from a baseline
    /// taken on its first wake-up and again after every [`clean`](Self::clean).
    /// The stream ends on shutdown.
    pub fn subscribe_changes(&self, kind: ChannelKind, rate: UpdateRate) -> ChangeStream {
        let buffer = Arc::clone(&self.buffer);
        let materializer = self.materializer.clone();
        let mut engine = DiffEngine::new(self.config.renew());
        let mut cleans = self.cleans.subscribe();

        let wakeups = WatchStream::new(self.updates.clone());
        let wakeups = match rate.throttle_interval() {
            Some(period) => wakeups.throttle(period).boxed(),
            None => wakeups.boxed(),
        };

        wakeups
            .take_until(self.cancel.clone().cancelled_owned())
            .filter_map(move |_| {
                if cleans.has_changed().unwrap_or(false) {
                    cleans.mark_unchanged();
                    engine.reset_baseline();
                }
                let changes = engine.diff(kind, &materializer, &buffer.snapshot());
                future::ready((!changes.is_empty()).then_some(changes))
            })
            .boxed()
    }

    /// Wait until at least `min` frames are buffered.
    ///
    /// Returns `false` if ingestion stopped before that happened.
    pub async fn wait_for_frames(&self, min: usize) -> bool {
        let mut updates = self.updates.clone();
        let buffer = &self.buffer;
        let _ = updates.wait_for(|_| buffer.len() >= min).await;
        buffer.len() >= min
    }

    /// Stop ingestion and periodic saving.
    pub fn shutdown(&self) {
        debug!("Gateway shutting down");
        self.cancel.cancel();
    }

    /// Stop background tasks and wait until they have finished.
    pub async fn shutdown_and_wait(&mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Background task failed: {}", e);
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the gateway shuts down, either on request or because
    /// ingestion gave up.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    fn diff_engine(&self) -> MutexGuard<'_, DiffEngine> {
        self.diff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_persistence(
    buffer: Arc<FrameBuffer>,
    store: FrameStore,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match store.save(&buffer) {
                        Ok(count) => debug!("Periodic save wrote {} frames", count),
                        Err(e) => error!("Periodic save failed: {}", e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ReplayProvider;
    use crate::test_utils::{
        FailingProvider, analogue_frame, channel_provider, digital_frame, sample_schema,
        scratch_config,
    };

    #[tokio::test]
    async fn queries_follow_ingested_frames() {
        let frames = vec![analogue_frame(31, 10, 67.8, 1), digital_frame(21, 21, true)];
        let gateway = Gateway::with_provider(
            scratch_config("queries"),
            sample_schema(),
            ReplayProvider::from_frames(&frames),
        )
        .await
        .unwrap();

        let ready = tokio::time::timeout(Duration::from_secs(2), gateway.wait_for_frames(2)).await;
        assert_eq!(ready.ok(), Some(true));

        let Values::Analogue(analogue) = gateway.values(ChannelKind::Analogue) else {
            panic!("expected analogue values");
        };
        assert_eq!(analogue[&31][&10].value, Some(67.8));

        let Values::Digital(digital) = gateway.values(ChannelKind::Digital) else {
            panic!("expected digital values");
        };
        assert_eq!(digital[&21][&21].value, Some(true));

        let newest: Vec<u8> = gateway.frames().iter().map(|f| f.selector()).collect();
        assert_eq!(newest, vec![9, 3]);
        assert_eq!(gateway.last_frame().map(|f| f.node()), Some(21));
    }

    #[tokio::test]
    async fn difference_starts_with_baseline_and_clean_resets_it() {
        let gateway = Gateway::new(scratch_config("difference"), sample_schema());
        assert!(gateway.difference(ChannelKind::Digital).is_empty());

        // The baseline had no value for the pump yet, so it is skipped once
        gateway.buffer.append(digital_frame(21, 21, true));
        assert!(gateway.difference(ChannelKind::Digital).is_empty());
        assert_eq!(gateway.difference(ChannelKind::Digital).len(), 1);
        assert!(gateway.difference(ChannelKind::Digital).is_empty());

        gateway.clean().unwrap();
        assert_eq!(gateway.frame_count(), 0);
        gateway.buffer.append(digital_frame(21, 21, false));
        assert!(gateway.difference(ChannelKind::Digital).is_empty());

        gateway.buffer.append(digital_frame(21, 21, true));
        let Changes::Digital(changes) = gateway.difference(ChannelKind::Digital) else {
            panic!("expected digital changes");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].new, changes[0].old), (true, false));
    }

    #[tokio::test]
    async fn save_and_restore_through_gateway() {
        let config = scratch_config("persist");
        let gateway = Gateway::new(config.clone(), sample_schema());
        gateway.buffer.append(analogue_frame(31, 9, 52.1, 1));
        assert_eq!(gateway.save().unwrap(), 1);

        let restored = Gateway::with_provider(config, sample_schema(), ReplayProvider::new(vec![]))
            .await
            .unwrap();
        assert_eq!(restored.frame_count(), 1);
    }

    #[tokio::test]
    async fn send_requires_a_target() {
        let gateway = Gateway::new(scratch_config("send"), sample_schema());
        let err = gateway.send_value(31, 10, ChannelValue::Analogue(1.0), 1).await.unwrap_err();
        assert!(matches!(err, CoeError::Config { .. }));

        let err = gateway.send_value(31, 40, ChannelValue::Analogue(1.0), 1).await.unwrap_err();
        assert!(matches!(err, CoeError::IndexOutOfRange { .. }));
    }

    #[tokio::test]
    async fn subscriptions_report_changes_and_end_on_shutdown() {
        let frames = vec![
            digital_frame(21, 21, false),
            digital_frame(21, 21, true),
        ];
        let provider =
            ReplayProvider::from_frames(&frames).with_interval(Duration::from_millis(50));
        let gateway = Gateway::with_provider(scratch_config("subscribe"), sample_schema(), provider)
            .await
            .unwrap();

        let mut changes = gateway.subscribe_changes(ChannelKind::Digital, UpdateRate::Native);
        let first = tokio::time::timeout(Duration::from_secs(2), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind(), ChannelKind::Digital);

        gateway.shutdown();
        let end = tokio::time::timeout(Duration::from_secs(2), changes.next()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn clean_resets_subscriber_history() {
        let (feed, provider) = channel_provider();
        let gateway = Gateway::with_provider(scratch_config("sub-clean"), sample_schema(), provider)
            .await
            .unwrap();
        let quiet = Duration::from_millis(200);
        let pump = |on: bool| digital_frame(21, 21, on).as_bytes().to_vec();

        let mut changes = gateway.subscribe_changes(ChannelKind::Digital, UpdateRate::Native);
        assert!(tokio::time::timeout(quiet, changes.next()).await.is_err());

        feed.send(pump(false)).unwrap();
        assert!(gateway.wait_for_frames(1).await);
        assert!(tokio::time::timeout(quiet, changes.next()).await.is_err());

        feed.send(pump(true)).unwrap();
        assert!(gateway.wait_for_frames(2).await);
        let next = tokio::time::timeout(Duration::from_secs(2), changes.next()).await.unwrap();
        assert_eq!(next.map(|c| c.len()), Some(1));

        gateway.clean().unwrap();
        feed.send(pump(false)).unwrap();
        assert!(gateway.wait_for_frames(1).await);
        // The first wake after clean only takes a new baseline
        assert!(tokio::time::timeout(quiet, changes.next()).await.is_err());

        feed.send(pump(true)).unwrap();
        assert!(gateway.wait_for_frames(2).await);
        let next = tokio::time::timeout(Duration::from_secs(2), changes.next()).await.unwrap();
        let Some(Changes::Digital(list)) = next else {
            panic!("expected digital changes, got {:?}", next);
        };
        assert_eq!((list[0].new, list[0].old), (true, false));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ingestion_stops_the_gateway() {
        let gateway =
            Gateway::with_provider(scratch_config("failing"), sample_schema(), FailingProvider)
                .await
                .unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(60), gateway.stopped()).await;
        assert!(stopped.is_ok(), "gateway kept running without ingestion");
        assert!(gateway.is_shut_down());
    }
}
