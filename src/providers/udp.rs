//! UDP provider for live CoE traffic

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::provider::Provider;
use crate::types::Frame;
use crate::{CoeError, Result};

/// Receive buffer size; larger than a frame so oversized datagrams are
/// reported with their real length instead of being truncated to 14 bytes.
const RECV_BUFFER: usize = 64;

/// Provider that receives CoE datagrams on a bound UDP socket
pub struct UdpProvider {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: [u8; RECV_BUFFER],
}

impl UdpProvider {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            CoeError::transport_failed_with_source(format!("cannot bind {}", addr), e)
        })?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| CoeError::transport_failed_with_source("cannot read local address", e))?;

        info!(%local_addr, "Listening for CoE frames");
        Ok(Self { socket, local_addr, buf: [0; RECV_BUFFER] })
    }

    /// Address actually bound; differs from the request when port 0 was used
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait::async_trait]
impl Provider for UdpProvider {
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        let (len, peer) = self
            .socket
            .recv_from(&mut self.buf)
            .await
            .map_err(|e| CoeError::transport_failed_with_source("receive failed", e))?;

        trace!(%peer, len, "Datagram received");
        Ok(Some(self.buf[..len].to_vec()))
    }

    fn source_name(&self) -> String {
        format!("udp://{}", self.local_addr)
    }
}

/// Sends outbound frames to a fixed CoE node address
#[derive(Debug)]
pub struct FrameSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl FrameSender {
    /// Bind an ephemeral socket of the target's address family
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| CoeError::transport_failed_with_source("cannot bind sender", e))?;

        debug!(%target, "Frame sender ready");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send the 14 wire bytes of a frame
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        self.socket.send_to(frame.as_bytes(), self.target).await.map_err(|e| {
            CoeError::transport_failed_with_source(format!("send to {} failed", self.target), e)
        })?;
        debug!(target = %self.target, frame = %frame, "Sent frame");
        Ok(())
    }
}
