//! TCP line transport.
//!
//! [`TcpTransport`] implements the [`Transport`] trait over a TCP stream.
//! Outbound lines are written directly with a `\n` terminator. Inbound bytes
//! are read by a background task that splits them into lines and queues them,
//! so the client's update pump can drain everything already received with a
//! zero timeout and never blocks on the socket.
//!
//! # Example
//!
//! ```no_run
//! use vrc_transport::TcpTransport;
//! use vrc_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> vrc_core::Result<()> {
//! let mut transport = TcpTransport::connect("10.0.0.5:4990").await?;
//! let handshake = transport.receive(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vrc_core::error::{Error, Result};
use vrc_core::transport::Transport;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest inbound line accepted before the partial line is discarded.
const MAX_LINE: usize = 64 * 1024;

/// Capacity of the inbound line queue.
const LINE_QUEUE: usize = 4096;

/// TCP transport carrying newline-framed protocol lines.
#[derive(Debug)]
pub struct TcpTransport {
    /// Write half of the stream, `None` after `close()` is called.
    writer: Option<OwnedWriteHalf>,
    /// Lines decoded by the reader task.
    lines: mpsc::Receiver<String>,
    /// Set once the reader task has finished and every line was drained.
    lost: bool,
    /// Cancels the reader task.
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    /// The address string for logging.
    addr: String,
}

impl TcpTransport {
    /// Connect to a `host:port` endpoint using the default timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a `host:port` endpoint with a specified timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to server"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "TCP connection failed");
                map_connect_error(e, addr)
            })?;

        // Commands are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "TCP connection established");
        Ok(Self::from_stream(stream, addr.to_string()))
    }

    /// Wrap an already-connected `TcpStream`.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (line_tx, line_rx) = mpsc::channel(LINE_QUEUE);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(read_half, line_tx, cancel.clone(), addr.clone()));

        Self {
            writer: Some(write_half),
            lines: line_rx,
            lost: false,
            cancel,
            reader: Some(reader),
            addr,
        }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// Reader task: split the inbound byte stream into lines.
///
/// Exits on EOF, read error, cancellation, or when the transport is dropped.
/// Dropping `line_tx` tells the transport the peer is gone.
async fn read_loop(
    mut stream: OwnedReadHalf,
    line_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    addr: String,
) {
    let mut buf = BytesMut::with_capacity(8192);

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(addr = %addr, "TCP reader cancelled");
                return;
            }
            read = stream.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::warn!(addr = %addr, "Peer closed connection");
                return;
            }
            Ok(_) => {
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let raw = buf.split_to(pos + 1);
                    let text = String::from_utf8_lossy(&raw[..pos]);
                    let line = text.trim_end_matches('\r');
                    if line.is_empty() {
                        continue;
                    }
                    tracing::trace!(addr = %addr, line = %line, "Received line");
                    if line_tx.send(line.to_string()).await.is_err() {
                        return;
                    }
                }
                if buf.len() > MAX_LINE {
                    tracing::warn!(
                        addr = %addr,
                        len = buf.len(),
                        "Inbound line exceeds limit, discarding"
                    );
                    buf.advance(buf.len());
                }
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to receive data");
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, line: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;
        if self.lost {
            return Err(Error::ConnectionLost);
        }

        tracing::trace!(addr = %self.addr, line = %line, "Sending line");

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        writer.write_all(&framed).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send line");
            map_io_error(e)
        })?;
        writer.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<String> {
        if self.writer.is_none() {
            return Err(Error::NotConnected);
        }

        if timeout.is_zero() {
            return match self.lines.try_recv() {
                Ok(line) => Ok(line),
                Err(TryRecvError::Empty) => Err(Error::Timeout),
                Err(TryRecvError::Disconnected) => {
                    self.lost = true;
                    Err(Error::ConnectionLost)
                }
            };
        }

        match tokio::time::timeout(timeout, self.lines.recv()).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => {
                self.lost = true;
                Err(Error::ConnectionLost)
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }

        if let Some(mut writer) = self.writer.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");
            if let Err(e) = writer.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some() && !self.lost
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.writer.is_some() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped, closing connection");
        }
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {addr}"))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
