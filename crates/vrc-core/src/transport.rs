//! Transport trait for server communication.
//!
//! The [`Transport`] trait abstracts over the link to the remote server. It
//! moves whole protocol lines (without the trailing newline) and is assumed
//! reliable, ordered, and a single logical connection per client.
//!
//! The client's update pump drains the transport with a zero timeout, so
//! `receive` must return promptly with [`Error::Timeout`] when nothing is
//! queued. Implementations exist for TCP (`vrc-transport`) and for scripted
//! testing (`MockTransport` in `vrc-test-harness`).

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous line-level transport to the server.
#[async_trait]
pub trait Transport: Send {
    /// Send one protocol line to the server.
    ///
    /// The line must not contain a newline; the transport adds framing.
    async fn send(&mut self, line: &str) -> Result<()>;

    /// Receive the next protocol line from the server.
    ///
    /// Waits up to `timeout` (which may be zero) and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) when no line is
    /// available, or [`Error::ConnectionLost`](crate::error::Error::ConnectionLost)
    /// once the peer has gone away and every buffered line was delivered.
    async fn receive(&mut self, timeout: Duration) -> Result<String>;

    /// Close the transport.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
