//! Client configuration.

use std::time::Duration;

/// Default command timeout (2 seconds).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default handshake timeout (5 seconds).
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait per pump iteration inside blocking operations.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Broadcast channel capacity for event subscribers.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Options for configuring a [`VrcClient`](crate::VrcClient).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Client program name sent during registration.
    pub client_name: String,
    /// How long a blocking operation waits for its response.
    pub command_timeout: Duration,
    /// How long to wait for the version and handle lines after connecting.
    pub handshake_timeout: Duration,
    /// Longest single transport wait inside a blocking operation.
    pub poll_interval: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_name: "vrclib".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
