//! Client event types.
//!
//! Events are published by the update pump through a
//! [`tokio::sync::broadcast`] channel as it applies server changes. Hosts
//! that prefer polling can ignore them entirely and rely on the per-collection
//! version counters; event-driven hosts subscribe instead of diffing.

use crate::id::Id;
use crate::types::{CallProgress, EntityKind, LicenseStatus};

/// An event emitted by the client when mirrored state changes.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may observe `RecvError::Lagged` and should fall back to reading
/// version counters.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport handshake completed.
    Connected {
        /// Client handle assigned by the server.
        handle: u32,
    },

    /// The transport was closed or lost.
    Disconnected,

    /// A cached collection changed and its version advanced.
    CollectionChanged {
        /// Which collection changed.
        kind: EntityKind,
        /// The collection's new version.
        version: u32,
    },

    /// The server confirmed a selection (role, entity state, cloud, or the
    /// net of a radio).
    SelectionChanged {
        /// Which kind of selection changed.
        kind: EntityKind,
        /// For radio nets, the radio whose net changed.
        owner: Option<Id>,
        /// The confirmed selection.
        selected: Option<Id>,
    },

    /// A locally requested selection was rejected and reverted.
    SelectionReverted {
        /// Which kind of selection reverted.
        kind: EntityKind,
        /// For radio nets, the radio whose request was rejected.
        owner: Option<Id>,
    },

    /// An endpoint's progress within a call changed.
    EndpointChanged {
        /// The call.
        call: Id,
        /// The endpoint.
        endpoint: Id,
        /// Its new progress state.
        progress: CallProgress,
    },

    /// A call invitation arrived in the inbox.
    InvitationReceived {
        /// The call the invitation is for.
        call: Id,
    },

    /// A live-radio-control set request was answered.
    RadioControlResult {
        /// Empty on success, otherwise the server's error text.
        error: String,
        /// The error channel's new version.
        version: u32,
    },

    /// A license changed status.
    LicenseChanged {
        /// Process-local license request id.
        request_id: i32,
        /// The new status.
        status: LicenseStatus,
    },
}
