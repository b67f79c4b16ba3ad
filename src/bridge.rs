//! Forwarding of changes to an FHEM home automation server
//!
//! FHEM's telnet port takes one command per line and prints its prompt once
//! a command is done. The bridge subscribes to the analogue and digital change
//! streams of a [`Gateway`]. For every batch it opens a session, writes one
//! `setreading <device> <reading> <value>` per change and closes it again.
//!
//! Readings are named after the channel schema with spaces replaced by `_`;
//! digital values are sent as `on`/`off`. With `create_device` set, the dummy
//! device and its attributes are defined once before the first update.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::config::FhemConfig;
use crate::diff::Changes;
use crate::gateway::Gateway;
use crate::schema::ChannelSchema;
use crate::types::{ChannelKind, UpdateRate};
use crate::{CoeError, Result};

/// One telnet session with FHEM.
pub struct FhemSession<S> {
    stream: S,
    prompt: Vec<u8>,
    timeout: Duration,
}

impl FhemSession<TcpStream> {
    /// Connect to `address` and wait for the first prompt.
    pub async fn connect(address: &str, prompt: &str, timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(CoeError::transport_failed_with_source(
                    format!("cannot connect to FHEM at {}", address),
                    e,
                ));
            }
            Err(_) => {
                return Err(CoeError::transport_failed(format!(
                    "connecting to FHEM at {} timed out",
                    address
                )));
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|e| CoeError::transport_failed_with_source("cannot configure socket", e))?;

        debug!("Connected to FHEM at {}", address);
        Self::start(stream, prompt, timeout).await
    }
}

impl<S> FhemSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an open stream and wait for the prompt.
    pub async fn start(stream: S, prompt: &str, timeout: Duration) -> Result<Self> {
        let mut session = Self { stream, prompt: prompt.as_bytes().to_vec(), timeout };
        session.command("").await?;
        Ok(session)
    }

    /// Send one command line and return whatever FHEM printed before its prompt.
    pub async fn command(&mut self, line: &str) -> Result<String> {
        if !line.is_empty() {
            debug!("FHEM command: {}", line);
        }
        let io_error = |e: std::io::Error| {
            CoeError::transport_failed_with_source("FHEM session write failed", e)
        };
        self.stream.write_all(format!("{}\n", line).as_bytes()).await.map_err(io_error)?;
        self.stream.flush().await.map_err(io_error)?;
        self.read_until_prompt().await
    }

    /// Close the write side of the session.
    pub async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| CoeError::transport_failed_with_source("closing FHEM session failed", e))
    }

    async fn read_until_prompt(&mut self) -> Result<String> {
        let mut seen = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let read = tokio::time::timeout(self.timeout, self.stream.read(&mut chunk))
                .await
                .map_err(|_| CoeError::transport_failed("timed out waiting for the FHEM prompt"))?
                .map_err(|e| {
                    CoeError::transport_failed_with_source("FHEM session read failed", e)
                })?;
            if read == 0 {
                return Err(CoeError::transport_failed("FHEM closed the session"));
            }
            seen.extend_from_slice(&chunk[..read]);

            if let Some(end) = find(&seen, &self.prompt) {
                return Ok(String::from_utf8_lossy(&seen[..end]).trim().to_string());
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Change consumer writing readings into an FHEM dummy device.
#[derive(Debug, Clone)]
pub struct FhemBridge {
    config: FhemConfig,
}

impl FhemBridge {
    pub fn new(config: FhemConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FhemConfig {
        &self.config
    }

    /// Commands defining the dummy device and its optional attributes.
    pub fn define_commands(&self) -> Vec<String> {
        let device = &self.config.device;
        let mut commands = vec![
            format!("define {} dummy", device),
            format!("attr {} event-on-change-reading .*", device),
        ];
        let attributes = [
            ("alias", &self.config.alias),
            ("group", &self.config.group),
            ("room", &self.config.room),
        ];
        for (name, value) in attributes {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                commands.push(format!("attr {} {} {}", device, name, value));
            }
        }
        commands
    }

    /// One `setreading` per change; channels without a name are skipped.
    pub fn setreading_commands(&self, schema: &ChannelSchema, changes: &Changes) -> Vec<String> {
        let device = &self.config.device;
        let kind = changes.kind();
        let reading = |node: u8, index: u8| {
            let name = schema.reading_name(kind, node, index);
            if name.is_none() {
                debug!(node, index, "Skipping unnamed {} channel", kind);
            }
            name
        };

        match changes {
            Changes::Analogue(list) => list
                .iter()
                .filter_map(|c| {
                    let name = reading(c.node, c.index)?;
                    Some(format!("setreading {} {} {:?}", device, name, c.new))
                })
                .collect(),
            Changes::Digital(list) => list
                .iter()
                .filter_map(|c| {
                    let name = reading(c.node, c.index)?;
                    let state = if c.new { "on" } else { "off" };
                    Some(format!("setreading {} {} {}", device, name, state))
                })
                .collect(),
        }
    }

    /// Open a session to the configured server.
    pub async fn open(&self) -> Result<FhemSession<TcpStream>> {
        FhemSession::connect(&self.config.address, &self.config.prompt, self.config.timeout())
            .await
    }

    /// Define the dummy device on the server.
    pub async fn create_device(&self) -> Result<()> {
        let mut session = self.open().await?;
        for command in self.define_commands() {
            let reply = session.command(&command).await?;
            if !reply.is_empty() {
                warn!("FHEM answered '{}' to '{}'", reply, command);
            }
        }
        session.close().await?;
        info!(device = %self.config.device, "FHEM device defined");
        Ok(())
    }

    /// Send one batch of changes. Returns the number of readings written.
    pub async fn forward(&self, schema: &ChannelSchema, changes: &Changes) -> Result<usize> {
        let commands = self.setreading_commands(schema, changes);
        if commands.is_empty() {
            return Ok(0);
        }

        let mut session = self.open().await?;
        for command in &commands {
            let reply = session.command(command).await?;
            if !reply.is_empty() {
                warn!("FHEM answered '{}' to '{}'", reply, command);
            }
        }
        session.close().await?;
        Ok(commands.len())
    }

    /// Forward changes of both kinds until the gateway shuts down.
    ///
    /// A failed batch is logged and dropped; the heartbeat re-sends
    /// unchanged readings later.
    pub async fn run(self, gateway: Arc<Gateway>) {
        let rate = UpdateRate::Max(self.config.rate_hz);
        let mut changes = futures::stream::select(
            gateway.subscribe_changes(ChannelKind::Analogue, rate),
            gateway.subscribe_changes(ChannelKind::Digital, rate),
        );
        let mut device_pending = self.config.create_device;
        info!(address = %self.config.address, device = %self.config.device, "FHEM bridge started");

        while let Some(batch) = changes.next().await {
            if device_pending {
                // One attempt only; a device that already exists makes FHEM complain
                device_pending = false;
                if let Err(e) = self.create_device().await {
                    error!("Failed to define FHEM device: {}", e);
                }
            }

            match self.forward(gateway.schema(), &batch).await {
                Ok(sent) => debug!(kind = %batch.kind(), sent, "Forwarded readings to FHEM"),
                Err(e) => {
                    error!("Dropping {} {} changes for FHEM: {}", batch.len(), batch.kind(), e)
                }
            }
        }

        info!("FHEM bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChannelChange;
    use crate::test_utils::{channel_provider, digital_frame, sample_schema, scratch_config};
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Minimal FHEM: records every non-empty line and answers with the prompt.
    async fn fake_fhem() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (reader, mut writer) = socket.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if !line.is_empty() {
                            let _ = tx.send(line);
                        }
                        if writer.write_all(b"fhem> ").await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        (addr, rx)
    }

    fn bridge(address: SocketAddr) -> FhemBridge {
        FhemBridge::new(FhemConfig {
            address: address.to_string(),
            room: Some("cellar".into()),
            rate_hz: 0,
            ..FhemConfig::default()
        })
    }

    fn pump_on() -> Changes {
        Changes::Digital(vec![ChannelChange { node: 21, index: 21, new: true, old: false }])
    }

    #[test]
    fn readings_use_schema_names() {
        let bridge = FhemBridge::new(FhemConfig::default());
        let schema = sample_schema();

        let analogue = Changes::Analogue(vec![
            ChannelChange { node: 31, index: 10, new: 52.0, old: 51.5 },
            ChannelChange { node: 99, index: 1, new: 1.0, old: 2.0 },
        ]);
        assert_eq!(
            bridge.setreading_commands(&schema, &analogue),
            vec!["setreading coe buffer_top 52.0".to_string()]
        );

        let digital = Changes::Digital(vec![
            ChannelChange { node: 21, index: 21, new: false, old: true },
            ChannelChange { node: 21, index: 3, new: true, old: false },
        ]);
        assert_eq!(
            bridge.setreading_commands(&schema, &digital),
            vec!["setreading coe pump off".to_string(), "setreading coe valve on".to_string()]
        );
    }

    #[test]
    fn define_commands_include_configured_attributes() {
        let bridge = FhemBridge::new(FhemConfig {
            device: "heating".into(),
            alias: Some("Heating".into()),
            group: Some(String::new()),
            ..FhemConfig::default()
        });
        assert_eq!(
            bridge.define_commands(),
            vec![
                "define heating dummy".to_string(),
                "attr heating event-on-change-reading .*".to_string(),
                "attr heating alias Heating".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn session_waits_for_a_split_prompt() {
        let (client, mut server) = tokio::io::duplex(256);
        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(b"fh").await.unwrap();
            server.write_all(b"em> ").await.unwrap();

            let read = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..read], b"list\n");
            server.write_all(b"coe dummy\nfhem> ").await.unwrap();
        });

        let mut session =
            FhemSession::start(client, "fhem> ", Duration::from_secs(1)).await.unwrap();
        assert_eq!(session.command("list").await.unwrap(), "coe dummy");
        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let result = FhemSession::start(client, "fhem> ", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(CoeError::Transport { .. })));
    }

    #[tokio::test]
    async fn forward_writes_one_setreading_per_change() {
        let (addr, mut received) = fake_fhem().await;
        let changes = pump_on();

        let sent = bridge(addr).forward(&sample_schema(), &changes).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(received.recv().await.as_deref(), Some("setreading coe pump on"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let changes = pump_on();
        let err = bridge(addr).forward(&sample_schema(), &changes).await.unwrap_err();
        assert!(matches!(err, CoeError::Transport { .. }));
    }

    #[tokio::test]
    async fn run_defines_the_device_then_forwards_changes() {
        let (addr, mut received) = fake_fhem().await;
        let (feed, provider) = channel_provider();
        let gateway = Arc::new(
            Gateway::with_provider(scratch_config("fhem-run"), sample_schema(), provider)
                .await
                .unwrap(),
        );

        let mut config = bridge(addr).config().clone();
        config.create_device = true;
        let task = tokio::spawn(FhemBridge::new(config).run(Arc::clone(&gateway)));

        // Keep the pump on until the bridge has reported it
        let mut lines = Vec::new();
        let reported = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                feed.send(digital_frame(21, 21, true).as_bytes().to_vec()).unwrap();
                while let Ok(Some(line)) =
                    tokio::time::timeout(Duration::from_millis(100), received.recv()).await
                {
                    lines.push(line);
                }
                if lines.iter().any(|l| l.starts_with("setreading")) {
                    break;
                }
            }
        })
        .await;
        assert!(reported.is_ok(), "nothing forwarded, got {:?}", lines);

        assert_eq!(
            &lines[..4],
            &[
                "define coe dummy".to_string(),
                "attr coe event-on-change-reading .*".to_string(),
                "attr coe room cellar".to_string(),
                "setreading coe pump on".to_string(),
            ]
        );

        gateway.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
