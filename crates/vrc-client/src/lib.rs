//! State-mirroring client for VRC voice and radio communications servers.
//!
//! This crate keeps a local mirror of everything a VRC server publishes to
//! one client station and turns host requests into server commands. It
//! provides:
//!
//! - **Entity cache** ([`cache`], [`collection`], [`entities`]) -- one
//!   container per entity type with a dense index view, an id cursor view,
//!   and a version counter that increases with every applied change.
//! - **Selections** ([`triad`]) -- optimistic set/active tracking for the
//!   role, entity state, cloud, and each radio's net.
//! - **Calls** ([`calls`]) -- call/endpoint signaling state and the
//!   invitation inbox.
//! - **Live radio control** ([`radctrl`]) -- typed settings per live radio
//!   plus a global error channel for rejected sets.
//! - **Licenses** ([`license`]) and the session, headset and phone
//!   singletons ([`session`]).
//! - **VrcClient** ([`client`]) -- the update pump and command plumbing,
//!   with the operations in `station_ops`, `radio_ops` and `call_ops`.
//! - **VrcClientBuilder** ([`builder`]) -- configures and connects a client.
//!
//! # Architecture
//!
//! The host owns the [`VrcClient`] and calls
//! [`update`](VrcClient::update) once per cycle. Server deltas are applied
//! only inside the pump, in arrival order, so readers never observe a
//! half-applied change. Setters send a command and return; the mirror moves
//! when the server reports the new state. Blocking operations (server and
//! cloud connect, call creation, license requests, headset presets, live
//! radio sets) run the pump until their response arrives or the command
//! timeout elapses.
//!
//! # Example
//!
//! ```no_run
//! use vrc_client::VrcClientBuilder;
//!
//! # async fn example() -> vrc_core::Result<()> {
//! let mut client = VrcClientBuilder::new().connect("10.0.0.5:4990").await?;
//! client.update().await;
//! if let Some(role) = client.roles().first().cloned() {
//!     client.set_role(role.as_str()).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod calls;
pub mod client;
pub mod collection;
pub mod entities;
pub mod license;
pub mod options;
pub mod radctrl;
pub mod session;
pub mod triad;

mod call_ops;
mod correlator;
mod radio_ops;
mod station_ops;

#[cfg(test)]
mod test_support;

pub use builder::VrcClientBuilder;
pub use cache::{Applied, EntityCache, SequenceFilter};
pub use calls::{Call, CallTable, Endpoint, EndpointUpdate, Invitation};
pub use client::VrcClient;
pub use collection::{Collection, Entity, Fields, Singleton};
pub use entities::{
    Cloud, EntityState, Jammer, Joystick, Net, NetOverride, Operator, Playsound, Radio,
    RadioEffect, Role,
};
pub use license::{License, LicenseTable};
pub use options::ClientOptions;
pub use radctrl::{RadioControl, RadioControlTable, Setting};
pub use session::{Headset, Phone, Session};
pub use triad::{SelectionTarget, Selections, Triad};
