//! Line-oriented front ends: stdin shell and TCP (telnet) server.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::handle_line;
use crate::gateway::Gateway;
use crate::{CoeError, Result};

/// Serve commands from stdin until `quit`, end of input or cancellation.
///
/// Returns `true` when the operator asked to quit.
pub async fn run_shell(
    gateway: Arc<Gateway>,
    prompt: String,
    cancel: CancellationToken,
) -> Result<bool> {
    debug!("Control shell started");
    session(&gateway, tokio::io::stdin(), tokio::io::stdout(), &prompt, "\n", &cancel).await
}

/// Accept TCP clients on `addr` until cancelled, one task per client.
///
/// Replies use CRLF line endings and every reply is followed by the prompt.
/// A client sending `quit` only closes its own connection.
pub async fn serve_telnet(
    gateway: Arc<Gateway>,
    addr: SocketAddr,
    prompt: String,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        CoeError::transport_failed_with_source(format!("cannot bind control port {}", addr), e)
    })?;
    serve_listener(gateway, listener, prompt, cancel).await
}

/// Like [`serve_telnet`] on an already bound listener.
pub async fn serve_listener(
    gateway: Arc<Gateway>,
    listener: TcpListener,
    prompt: String,
    cancel: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|e| CoeError::transport_failed_with_source("cannot read control address", e))?;
    info!("Control server listening on {}", local);

    let mut client_count = 0u64;
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                client_count += 1;
                let client = client_count;
                info!("[Client {}] Connected from {}", client, peer);

                let gateway = Arc::clone(&gateway);
                let prompt = prompt.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, &gateway, &prompt, &cancel).await {
                        error!("[Client {}] Connection error: {}", client, e);
                    }
                    info!("[Client {}] Disconnected", client);
                });
            }
            Err(e) => error!("Failed to accept control connection: {}", e),
        }
    }

    debug!("Control server stopped");
    Ok(())
}

async fn handle_client(
    socket: TcpStream,
    gateway: &Gateway,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let (reader, writer) = socket.into_split();
    session(gateway, reader, writer, prompt, "\r\n", cancel).await.map(|_| ())
}

/// Read lines, answer each, prompt again. Returns `true` on `quit`.
async fn session<R, W>(
    gateway: &Gateway,
    reader: R,
    mut writer: W,
    prompt: &str,
    newline: &str,
    cancel: &CancellationToken,
) -> Result<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let io_error = |e: std::io::Error| {
        CoeError::transport_failed_with_source("control session I/O failed", e)
    };
    let mut lines = BufReader::new(reader).lines();

    write_all(&mut writer, prompt).await.map_err(io_error)?;
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            line = lines.next_line() => line.map_err(io_error)?,
        };
        let Some(line) = line else {
            return Ok(false);
        };

        let reply = handle_line(gateway, &line).await;
        let mut out = String::new();
        for text in &reply.lines {
            // Multi-line replies (help) keep the session's line ending
            for part in text.split('\n') {
                out.push_str(part);
                out.push_str(newline);
            }
        }
        if reply.quit {
            write_all(&mut writer, &out).await.map_err(io_error)?;
            return Ok(true);
        }

        out.push_str(prompt);
        write_all(&mut writer, &out).await.map_err(io_error)?;
    }
}

async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}
