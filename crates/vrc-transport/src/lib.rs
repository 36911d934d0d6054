//! Transport implementations for the VRC client.
//!
//! This crate provides [`TcpTransport`], a concrete implementation of the
//! [`Transport`](vrc_core::Transport) trait that frames newline-terminated
//! protocol lines over a TCP connection.
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
//! transport.send("C1|network disconnect").await?;
//! let line = transport.receive(Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

pub use tcp::TcpTransport;
