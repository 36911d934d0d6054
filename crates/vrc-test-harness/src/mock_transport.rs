//! Scripted mock transport for deterministic testing of the client.
//!
//! [`MockTransport`] implements the line-level [`Transport`] trait. It plays
//! the part of the server: tests inject status lines through a cloned
//! [`MockHandle`], register responders that answer commands as they are
//! sent, and inspect the log of everything the client wrote.
//!
//! # Example
//!
//! ```
//! use vrc_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let server = mock.handle();
//!
//! // Handshake lines delivered on the client's next update.
//! server.greet(0x1234);
//!
//! // Answer the next `call create` with a call id. `{seq}` is replaced with
//! // the command's sequence number.
//! server.respond("call create", &["R{seq}|0|CALL0000000000000000000000000001"]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use vrc_core::error::{Error, Result};
use vrc_core::transport::Transport;

/// Granularity used while waiting for lines with a non-zero timeout.
const POLL_STEP: Duration = Duration::from_millis(1);

/// A scripted reply to commands starting with a given prefix.
#[derive(Debug, Clone)]
struct Responder {
    /// Command text prefix (without the `C<seq>|` header).
    prefix: String,
    /// Lines queued when the responder fires. `{seq}` is substituted.
    lines: Vec<String>,
    /// Whether the responder stays registered after firing.
    persistent: bool,
}

#[derive(Debug)]
struct Inner {
    /// Lines waiting to be delivered by `receive()`.
    incoming: VecDeque<String>,
    /// Registered responders, matched in registration order.
    responders: Vec<Responder>,
    /// Every line passed to `send()`.
    sent: Vec<String>,
    /// Whether the simulated peer is still there.
    peer_connected: bool,
    /// Whether the client called `close()`.
    closed: bool,
    /// Acknowledge unmatched commands with `R<seq>|0|`.
    auto_ack: bool,
}

/// A mock [`Transport`] driven by a test through a [`MockHandle`].
///
/// Unlike a real connection, sends never block and `receive()` returns
/// immediately once a scripted line is queued.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

/// Test-side control surface for a [`MockTransport`].
///
/// Cloning the handle shares the same scripted server state, so a handle can
/// be moved into a spawned task that injects lines later.
#[derive(Debug, Clone)]
pub struct MockHandle {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Split `C<seq>|<command>` into its parts.
fn split_command(line: &str) -> Option<(u32, &str)> {
    let body = line.strip_prefix('C')?;
    let (seq, command) = body.split_once('|')?;
    Some((seq.parse().ok()?, command))
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(Inner {
                incoming: VecDeque::new(),
                responders: Vec::new(),
                sent: Vec::new(),
                peer_connected: true,
                closed: false,
                auto_ack: false,
            })),
        }
    }

    /// Get a handle for scripting this transport from the test.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queue a line for the client to receive.
    pub fn push_line(&self, line: impl Into<String>) {
        lock(&self.inner).incoming.push_back(line.into());
    }

    /// Queue several lines in order.
    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = lock(&self.inner);
        inner.incoming.extend(lines.into_iter().map(Into::into));
    }

    /// Queue the handshake (`V1.0.0` then `H<handle>`).
    pub fn greet(&self, handle: u32) {
        self.push_lines([String::from("V1.0.0"), format!("H{handle:08X}")]);
    }

    /// Answer the next command starting with `prefix` with `lines`.
    ///
    /// Each occurrence of `{seq}` in a line is replaced with the command's
    /// sequence number. The responder is consumed when it fires.
    pub fn respond(&self, prefix: &str, lines: &[&str]) {
        self.add_responder(prefix, lines, false);
    }

    /// Like [`respond`](Self::respond) but the responder fires for every
    /// matching command.
    pub fn respond_always(&self, prefix: &str, lines: &[&str]) {
        self.add_responder(prefix, lines, true);
    }

    fn add_responder(&self, prefix: &str, lines: &[&str], persistent: bool) {
        lock(&self.inner).responders.push(Responder {
            prefix: prefix.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            persistent,
        });
    }

    /// Acknowledge every command no responder matches with `R<seq>|0|`.
    pub fn set_auto_ack(&self, enabled: bool) {
        lock(&self.inner).auto_ack = enabled;
    }

    /// Every raw line the client sent, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.inner).sent.clone()
    }

    /// The command text of every sent line (without the `C<seq>|` header).
    pub fn sent_commands(&self) -> Vec<String> {
        lock(&self.inner)
            .sent
            .iter()
            .map(|line| match split_command(line) {
                Some((_, command)) => command.to_string(),
                None => line.clone(),
            })
            .collect()
    }

    /// The command text of the most recent send.
    pub fn last_command(&self) -> Option<String> {
        self.sent_commands().pop()
    }

    /// Forget the send log.
    pub fn clear_sent(&self) {
        lock(&self.inner).sent.clear();
    }

    /// Number of lines still waiting to be received.
    pub fn pending_lines(&self) -> usize {
        lock(&self.inner).incoming.len()
    }

    /// Simulate the server dropping the connection.
    ///
    /// Lines already queued are still delivered; after that `receive()`
    /// reports [`Error::ConnectionLost`].
    pub fn disconnect(&self) {
        lock(&self.inner).peer_connected = false;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, line: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(Error::NotConnected);
        }
        if !inner.peer_connected {
            return Err(Error::ConnectionLost);
        }

        inner.sent.push(line.to_string());

        let (seq, command) = split_command(line)
            .ok_or_else(|| Error::Protocol(format!("mock transport got non-command line: {line}")))?;

        let matched = inner
            .responders
            .iter()
            .position(|r| command.starts_with(&r.prefix));
        match matched {
            Some(index) => {
                let responder = if inner.responders[index].persistent {
                    inner.responders[index].clone()
                } else {
                    inner.responders.remove(index)
                };
                let seq = seq.to_string();
                for l in responder.lines {
                    inner.incoming.push_back(l.replace("{seq}", &seq));
                }
            }
            None if inner.auto_ack => inner.incoming.push_back(format!("R{seq}|0|")),
            None => {}
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = lock(&self.inner);
                if inner.closed {
                    return Err(Error::NotConnected);
                }
                if let Some(line) = inner.incoming.pop_front() {
                    return Ok(line);
                }
                if !inner.peer_connected {
                    return Err(Error::ConnectionLost);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.incoming.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let inner = lock(&self.inner);
        inner.peer_connected && !inner.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushed_lines_are_received_in_order() {
        let mut mock = MockTransport::new();
        let server = mock.handle();
        server.push_lines(["V1.0.0", "H00000001"]);

        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "V1.0.0");
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "H00000001");
        assert!(matches!(
            mock.receive(Duration::ZERO).await.unwrap_err(),
            Error::Timeout
        ));
    }

    #[tokio::test]
    async fn responder_substitutes_sequence() {
        let mut mock = MockTransport::new();
        let server = mock.handle();
        server.respond("call create", &["R{seq}|0|abc"]);

        mock.send("C7|call create").await.unwrap();
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "R7|0|abc");

        // One-shot responder is gone.
        mock.send("C8|call create").await.unwrap();
        assert!(matches!(
            mock.receive(Duration::ZERO).await.unwrap_err(),
            Error::Timeout
        ));
    }

    #[tokio::test]
    async fn persistent_responder_fires_repeatedly() {
        let mut mock = MockTransport::new();
        let server = mock.handle();
        server.respond_always("role set", &["R{seq}|0|"]);

        mock.send("C1|role set x").await.unwrap();
        mock.send("C2|role set y").await.unwrap();
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "R1|0|");
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "R2|0|");
    }

    #[tokio::test]
    async fn auto_ack_answers_unmatched_commands() {
        let mut mock = MockTransport::new();
        let server = mock.handle();
        server.set_auto_ack(true);

        mock.send("C3|headset set vox=1").await.unwrap();
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "R3|0|");
    }

    #[tokio::test]
    async fn tracks_sent_commands() {
        let mut mock = MockTransport::new();
        let server = mock.handle();

        mock.send("C1|network disconnect").await.unwrap();
        mock.send("C2|call create").await.unwrap();

        assert_eq!(server.sent(), vec!["C1|network disconnect", "C2|call create"]);
        assert_eq!(
            server.sent_commands(),
            vec!["network disconnect", "call create"]
        );
        assert_eq!(server.last_command().as_deref(), Some("call create"));

        server.clear_sent();
        assert!(server.sent().is_empty());
    }

    #[tokio::test]
    async fn non_command_line_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send("hello").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn receive_waits_for_late_lines() {
        let mut mock = MockTransport::new();
        let server = mock.handle();

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.push_line("M1|late");
        });

        let line = mock.receive(Duration::from_secs(2)).await.unwrap();
        assert_eq!(line, "M1|late");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn peer_disconnect_drains_then_reports_lost() {
        let mut mock = MockTransport::new();
        let server = mock.handle();
        server.push_line("M1|bye");
        server.disconnect();

        assert!(!mock.is_connected());
        assert_eq!(mock.receive(Duration::ZERO).await.unwrap(), "M1|bye");
        assert!(matches!(
            mock.receive(Duration::ZERO).await.unwrap_err(),
            Error::ConnectionLost
        ));
        assert!(matches!(
            mock.send("C1|call create").await.unwrap_err(),
            Error::ConnectionLost
        ));
    }

    #[tokio::test]
    async fn close_rejects_further_io() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send("C1|call create").await.unwrap_err(),
            Error::NotConnected
        ));
        assert!(matches!(
            mock.receive(Duration::ZERO).await.unwrap_err(),
            Error::NotConnected
        ));
    }
}
