//! vrc-test-harness: Test utilities and mock transports for the VRC client.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! client without a real server, and [`MockTcpServer`] for testing transports
//! that communicate over TCP.

pub mod mock_server;
pub mod mock_transport;

pub use mock_server::MockTcpServer;
pub use mock_transport::{MockHandle, MockTransport};
