//! VrcClientBuilder -- fluent builder for constructing [`VrcClient`] instances.
//!
//! Separates configuration from construction so that callers can set
//! timeouts and the program name before a transport is attached.
//!
//! # Example
//!
//! ```no_run
//! use vrc_client::VrcClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> vrc_core::Result<()> {
//! let mut client = VrcClientBuilder::new()
//!     .client_name("trainer-station")
//!     .command_timeout(Duration::from_secs(3))
//!     .connect("10.0.0.5:4990")
//!     .await?;
//!
//! loop {
//!     if client.update().await {
//!         println!("{} radios", client.radios().count());
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use vrc_core::error::Result;
use vrc_core::transport::Transport;
use vrc_transport::TcpTransport;

use crate::client::VrcClient;
use crate::options::ClientOptions;

/// Fluent builder for [`VrcClient`].
///
/// All configuration has sensible defaults, so the simplest usage is:
///
/// ```ignore
/// let client = VrcClientBuilder::new().connect("10.0.0.5:4990").await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct VrcClientBuilder {
    options: ClientOptions,
}

impl VrcClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client program name sent during registration (default: "vrclib").
    pub fn client_name(mut self, name: &str) -> Self {
        self.options.client_name = name.to_string();
        self
    }

    /// Set how long blocking operations wait for a response (default: 2s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Set how long to wait for the connection handshake (default: 5s).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.handshake_timeout = timeout;
        self
    }

    /// Set the longest single transport wait inside a blocking operation
    /// (default: 10ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Set the event broadcast channel capacity (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// Replace every option at once.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a client with no transport.
    ///
    /// Reads return empty collections and blocking operations fail with
    /// [`Error::NotConnected`](vrc_core::Error::NotConnected).
    pub fn build(self) -> VrcClient {
        VrcClient::new(self.options, None)
    }

    /// Build a client over an already-connected transport.
    ///
    /// This is the primary entry point for testing. The handshake is
    /// processed by the first [`update`](VrcClient::update), or explicitly
    /// with [`wait_for_handshake`](VrcClient::wait_for_handshake).
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> VrcClient {
        VrcClient::new(self.options, Some(transport))
    }

    /// Connect over TCP, complete the handshake, and register the client.
    pub async fn connect(self, addr: &str) -> Result<VrcClient> {
        tracing::debug!(addr, "connecting to VRC server");
        let transport = TcpTransport::connect_with_timeout(addr, self.options.handshake_timeout).await?;
        let mut client = self.build_with_transport(Box::new(transport));
        let handle = client.wait_for_handshake().await?;
        tracing::debug!(addr, handle = %format!("{handle:08X}"), "VRC client connected");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrc_core::Error;
    use vrc_test_harness::MockTcpServer;

    #[test]
    fn builder_defaults() {
        let client = VrcClientBuilder::new().build();
        let options = client.options();
        assert_eq!(options.client_name, "vrclib");
        assert_eq!(options.command_timeout, Duration::from_secs(2));
        assert_eq!(options.event_capacity, 256);
        assert!(!client.is_connected());
    }

    #[test]
    fn builder_overrides() {
        let client = VrcClientBuilder::new()
            .client_name("station-7")
            .command_timeout(Duration::from_millis(250))
            .poll_interval(Duration::from_millis(1))
            .event_capacity(0)
            .build();
        assert_eq!(client.options().client_name, "station-7");
        assert_eq!(client.options().command_timeout, Duration::from_millis(250));
        assert_eq!(client.options().poll_interval, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn connect_over_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.greet(&["V1.4.0", "H0000002A"]);
        server.expect("C1|client program vrclib", &["R1|0|"]);
        let addr = server.addr().to_string();
        server.start();

        let mut client = VrcClientBuilder::new().connect(&addr).await.unwrap();
        assert_eq!(client.handle(), Some(0x2A));
        assert_eq!(client.protocol_version().unwrap().minor, 4);
        server.wait().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = match VrcClientBuilder::new().connect(&addr).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Transport(_) | Error::Io(_) | Error::Timeout));
    }
}
