//! Mock TCP server for transport-level testing.
//!
//! [`MockTcpServer`] is a lightweight line-oriented TCP listener pre-loaded
//! with a greeting and scripted request/response exchanges. It lets the TCP
//! transport and the full client stack be tested over a real socket without
//! a real server.
//!
//! # Example
//!
//! ```
//! use vrc_test_harness::MockTcpServer;
//!
//! # async fn example() -> vrc_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.greet(&["V1.0.0", "H00000001"]);
//! server.expect("C1|network disconnect", &["R1|0|"]);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to addr and test ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

use vrc_core::error::{Error, Result};

/// A scripted request line and the lines sent back for it.
#[derive(Debug, Clone)]
struct LineExpectation {
    request: String,
    responses: Vec<String>,
}

/// A mock line server for testing over TCP.
///
/// The server listens on a random localhost port. Once
/// [`start`](MockTcpServer::start) is called it accepts a single connection,
/// writes the greeting, then processes expectations in order. When all
/// expectations are met the connection is closed, which clients observe as a
/// lost connection.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    greeting: Vec<String>,
    expectations: VecDeque<LineExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on a random port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            greeting: Vec::new(),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Lines written as soon as the client connects.
    pub fn greet(&mut self, lines: &[&str]) {
        self.greeting = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Expect the client to send `request` (one line, exact match) and reply
    /// with `responses`.
    pub fn expect(&mut self, request: &str, responses: &[&str]) {
        self.expectations.push_back(LineExpectation {
            request: request.to_string(),
            responses: responses.iter().map(|l| l.to_string()).collect(),
        });
    }

    /// The address the server listens on, e.g. `127.0.0.1:54321`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving a single client in a background task.
    ///
    /// The listener is already bound, so a client may connect immediately.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let greeting = std::mem::take(&mut self.greeting);
        let expectations: Vec<LineExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            debug!(%peer, "mock server accepted client");

            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            for line in &greeting {
                writer
                    .write_all(format!("{line}\n").as_bytes())
                    .await
                    .map_err(|e| format!("greeting write error: {e}"))?;
            }

            for (i, expectation) in expectations.iter().enumerate() {
                let received = lines
                    .next_line()
                    .await
                    .map_err(|e| format!("expectation {i}: read error: {e}"))?
                    .ok_or_else(|| format!("expectation {i}: client disconnected"))?;

                if received != expectation.request {
                    return Err(format!(
                        "expectation {i}: request mismatch: expected {:?}, got {:?}",
                        expectation.request, received
                    ));
                }

                for response in &expectation.responses {
                    writer
                        .write_all(format!("{response}\n").as_bytes())
                        .await
                        .map_err(|e| format!("expectation {i}: write error: {e}"))?;
                }
                writer
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to finish and return any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn serves_greeting_and_expectations() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.greet(&["V1.0.0"]);
        server.expect("C1|ping", &["R1|0|pong"]);
        let addr = server.addr().to_string();
        server.start();

        let stream = TcpStream::connect(&addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "V1.0.0");
        writer.write_all(b"C1|ping\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "R1|0|pong");

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_request_mismatch() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect("C1|ping", &[]);
        let addr = server.addr().to_string();
        server.start();

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream.write_all(b"C1|pong\n").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("mismatch"));
    }
}
