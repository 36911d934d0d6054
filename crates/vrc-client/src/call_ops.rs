//! Call signaling and phone operations.
//!
//! Every request here only asks the server for a transition. Endpoint
//! state in [`CallTable`](crate::CallTable) changes when the server
//! confirms it through a `call` status line.

use vrc_core::error::{Error, Result};
use vrc_core::protocol;
use vrc_core::{wire_id, CallProgress, Id, LeaveReason};

use crate::client::VrcClient;
use crate::correlator::PendingKind;

impl VrcClient {
    /// Create a call and join it (blocking).
    ///
    /// Returns the new call's id. The call is listed straight away and
    /// stays listed until its endpoints have all left.
    pub async fn create_call(&mut self) -> Result<Id> {
        let data = self
            .round_trip(&protocol::cmd_call_create(), PendingKind::CallCreate)
            .await?
            .into_result()?;
        Id::parse(&data)
            .map_err(|e| Error::Protocol(format!("call create returned {data:?}: {e}")))
    }

    /// Invite an endpoint to a call.
    pub async fn call_invite(&mut self, call: &Id, endpoint: &Id) {
        self.fire(&protocol::cmd_call_invite(call, endpoint, None), PendingKind::Plain)
            .await;
    }

    /// Invite an endpoint and have it dial `number`.
    pub async fn call_invite_dial(&mut self, call: &Id, endpoint: &Id, number: &str) {
        let command = protocol::cmd_call_invite(call, endpoint, Some(number));
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Invite every crew member of the current entity state.
    pub async fn call_invite_crew(&mut self) {
        self.fire(&protocol::cmd_call_invite_crew(), PendingKind::Plain)
            .await;
    }

    /// Report this client's own progress on a call, e.g. accepting an
    /// invitation with [`CallProgress::Connected`] or holding.
    pub async fn call_progress(&mut self, call: &Id, state: CallProgress) {
        self.fire(&protocol::cmd_call_progress(call, state), PendingKind::Plain)
            .await;
    }

    /// Leave a call, giving the server the reason.
    pub async fn call_leave(&mut self, call: &Id, reason: LeaveReason) {
        self.fire(&protocol::cmd_call_leave(call, reason), PendingKind::Plain)
            .await;
    }

    /// Send DTMF key presses on a call.
    pub async fn call_press_key(&mut self, call: &Id, keys: &str) {
        self.fire(&protocol::cmd_call_press_key(call, keys), PendingKind::Plain)
            .await;
    }

    /// Ask a signaling endpoint to leave before it connects.
    ///
    /// Does nothing for endpoints that are not signaling.
    pub async fn call_leave_request(&mut self, call: &Id, endpoint: &Id) {
        let state = self.calls.endpoint_state(call.as_str(), endpoint.as_str());
        if state != Some(CallProgress::Signaling) {
            tracing::debug!(%call, %endpoint, ?state, "leave request ignored");
            return;
        }
        let command = protocol::cmd_call_leave_request(call, endpoint);
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Empty the invitation inbox.
    pub fn clear_invitations(&mut self) {
        self.calls.clear_invitations();
    }

    /// Attach the phone line to a call, or detach it with `None`.
    pub async fn phone_set_call(&mut self, call: Option<&Id>) {
        let command = protocol::cmd_set("phone", None, &[("call", wire_id(call).to_string())]);
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Set the phone line volume.
    pub async fn phone_set_volume(&mut self, volume: f32) {
        let command = protocol::cmd_set("phone", None, &[("volume", volume.to_string())]);
        self.fire(&command, PendingKind::Plain).await;
    }
}
