//! vrc-core: Core types, errors, and wire protocol for the VRC client.
//!
//! This crate defines the transport-agnostic pieces shared by the client,
//! the TCP transport, and the test harness. Host applications normally depend
//! on the `vrclib` facade instead.
//!
//! # Key types
//!
//! - [`Id`] -- validated 32-character entity identifier
//! - [`Transport`] -- line-level communication channel
//! - [`ClientEvent`] -- asynchronous state change notifications
//! - [`protocol`] -- line parsing and command builders
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod id;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use vrc_core::*`.
pub use error::{Error, Result};
pub use events::ClientEvent;
pub use id::{wire_id, Id, ID_LEN};
pub use protocol::SettingValue;
pub use transport::Transport;
pub use types::*;
