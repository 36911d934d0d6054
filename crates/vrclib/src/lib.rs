//! # vrclib -- Remote control for VRC voice and radio communications
//!
//! `vrclib` is an asynchronous Rust library for driving a VRC
//! communications server from a host application such as a trainer
//! station, an instructor console, or an automation script. It mirrors the
//! roles, radios, nets, calls and other entities the server publishes and
//! sends change requests back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vrclib::VrcClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = VrcClientBuilder::new()
//!         .client_name("trainer-station")
//!         .connect("10.0.0.5:4990")
//!         .await?;
//!
//!     client.update().await;
//!     for radio in client.radios().iter() {
//!         println!("{}: {:?}", radio.name, radio.net);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                              |
//! |---------------------|------------------------------------------------------|
//! | `vrc-core`          | Ids, enums, errors, events, [`Transport`], line protocol |
//! | `vrc-transport`     | TCP line transport                                   |
//! | `vrc-client`        | Entity mirror, selections, calls, [`VrcClient`]      |
//! | **`vrclib`**        | This facade crate -- re-exports everything           |
//!
//! ## The update cycle
//!
//! A [`VrcClient`] changes only inside [`VrcClient::update`] and the
//! blocking operations. Hosts either poll the per-collection version
//! counters ([`VrcClient::version`]) or subscribe to [`ClientEvent`]s.
//!
//! ```no_run
//! # async fn example(client: &mut vrclib::VrcClient) {
//! use vrclib::EntityKind;
//!
//! let mut seen = client.version(EntityKind::Radio);
//! loop {
//!     client.update().await;
//!     let now = client.version(EntityKind::Radio);
//!     if now != seen {
//!         seen = now;
//!         println!("{} radios", client.radios().count());
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! }
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Blocking operations return [`Result<T>`] with [`Error`] variants for
//! timeouts, rejections and connection loss. Setters never fail: with no
//! connection, or for an unknown id or out-of-range index, they do nothing.

pub use vrc_core::*;

pub use vrc_client::{
    Call, CallTable, ClientOptions, Cloud, Collection, Endpoint, Entity, EntityState, Fields,
    Headset, Invitation, Jammer, Joystick, License, LicenseTable, Net, NetOverride, Operator,
    Phone, Playsound, Radio, RadioControl, RadioControlTable, RadioEffect, Role,
    SelectionTarget, Selections, Session, Setting, Singleton, Triad, VrcClient,
    VrcClientBuilder,
};

/// Transport implementations.
pub mod transport {
    pub use vrc_transport::*;
}

/// Client internals: the entity cache, triads, and per-area tables.
pub mod client {
    pub use vrc_client::*;
}
