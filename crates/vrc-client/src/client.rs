//! The VRC client: mirrored server state, the update pump, and command
//! plumbing.
//!
//! [`VrcClient`] is an explicit context object owned by the host. Every
//! operation takes `&mut self`, so the borrow checker rules out reentrant
//! use: a blocking operation can never be started from inside the pump's
//! delta-application path.
//!
//! The host calls [`update`](VrcClient::update) once per cycle. It drains
//! everything the transport has queued, applies deltas in arrival order, and
//! reports whether any observable state changed. Blocking operations
//! (connect, call creation, license request, headset preset, live radio
//! control set) send their command and then run the same pump in a bounded
//! loop until the matching response arrives, the transport is lost, or the
//! command timeout elapses.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use vrc_core::error::{Error, Result};
use vrc_core::events::ClientEvent;
use vrc_core::protocol::{self, Change, Frame, ProtocolVersion, Response, StatusLine};
use vrc_core::transport::Transport;
use vrc_core::{EntityKind, Id, LicenseStatus};

use crate::cache::{EntityCache, SequenceFilter};
use crate::calls::CallTable;
use crate::collection::{Collection, Singleton};
use crate::correlator::{Correlator, PendingKind};
use crate::entities::{
    Cloud, EntityState, Jammer, Joystick, Net, Operator, Playsound, Radio, RadioEffect, Role,
};
use crate::license::LicenseTable;
use crate::options::ClientOptions;
use crate::radctrl::RadioControlTable;
use crate::session::{Headset, Phone, Session};
use crate::triad::{SelectionTarget, Selections};

/// Most lines handled by one pump before returning to the caller.
const MAX_LINES_PER_PUMP: usize = 4096;

/// How long a created call may stay empty before the server populates it.
const CREATED_CALL_GRACE: Duration = Duration::from_secs(10);

/// A client mirroring one VRC server.
pub struct VrcClient {
    transport: Option<Box<dyn Transport>>,
    pub(crate) options: ClientOptions,
    correlator: Correlator,
    sequences: SequenceFilter,
    pub(crate) cache: EntityCache,
    pub(crate) selections: Selections,
    pub(crate) calls: CallTable,
    pub(crate) radio_controls: RadioControlTable,
    pub(crate) licenses: LicenseTable,
    pub(crate) session: Singleton<Session>,
    pub(crate) headset: Singleton<Headset>,
    pub(crate) phone: Singleton<Phone>,
    /// Software PTT indices currently pressed.
    pub(crate) software_ptt: BTreeSet<u32>,
    handle: Option<u32>,
    protocol_version: Option<ProtocolVersion>,
    malformed: u64,
    /// Set by the pump, reported and cleared by `update()`.
    changed: bool,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl VrcClient {
    pub(crate) fn new(options: ClientOptions, transport: Option<Box<dyn Transport>>) -> Self {
        let (event_tx, _) = broadcast::channel(options.event_capacity.max(1));
        VrcClient {
            transport,
            options,
            correlator: Correlator::default(),
            sequences: SequenceFilter::default(),
            cache: EntityCache::default(),
            selections: Selections::default(),
            calls: CallTable::default(),
            radio_controls: RadioControlTable::default(),
            licenses: LicenseTable::default(),
            session: Singleton::default(),
            headset: Singleton::default(),
            phone: Singleton::default(),
            software_ptt: BTreeSet::new(),
            handle: None,
            protocol_version: None,
            malformed: 0,
            changed: false,
            event_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Wait for the server's version and handle lines, then register the
    /// client program name.
    ///
    /// Returns the client handle assigned by the server.
    pub async fn wait_for_handshake(&mut self) -> Result<u32> {
        let deadline = Instant::now() + self.options.handshake_timeout;
        let handle = loop {
            if let Some(handle) = self.handle {
                break handle;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            self.pump((deadline - now).min(self.options.poll_interval))
                .await?;
        };

        let register = protocol::cmd_client_program(&self.options.client_name);
        self.fire(&register, PendingKind::Plain).await;
        Ok(handle)
    }

    /// Whether a transport is attached and connected.
    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Close the transport and empty the mirror.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        tracing::debug!("closing client");
        let result = transport.close().await;
        self.reset_mirror();
        result
    }

    /// Client handle assigned by the server during the handshake.
    pub fn handle(&self) -> Option<u32> {
        self.handle
    }

    /// Protocol version announced by the server.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.protocol_version
    }

    /// Number of inbound lines dropped as malformed.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// The options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Subscribe to change events.
    ///
    /// Multiple subscribers can be created; each gets an independent copy
    /// of every event published after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Update pump
    // -----------------------------------------------------------------------

    /// Run one update cycle.
    ///
    /// Removes call endpoints that reached a terminal state during the
    /// previous cycle, then applies everything the transport has queued.
    /// Returns whether any mirrored state changed since the last call,
    /// including changes applied while a blocking operation was waiting.
    pub async fn update(&mut self) -> bool {
        if self.calls.sweep(std::time::Instant::now()) {
            self.mark(EntityKind::Call, self.calls.version());
        }
        if self.transport.is_some() {
            if let Err(e) = self.pump(Duration::ZERO).await {
                tracing::trace!(error = %e, "update ended with transport loss");
            }
        }
        std::mem::take(&mut self.changed)
    }

    /// Drain the transport, waiting up to `wait` for the first line.
    ///
    /// Fails with [`Error::ConnectionLost`] after tearing down the mirror
    /// when the transport reports loss, or [`Error::NotConnected`] when no
    /// transport is attached.
    pub(crate) async fn pump(&mut self, wait: Duration) -> Result<()> {
        let mut timeout = wait;
        for _ in 0..MAX_LINES_PER_PUMP {
            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            match transport.receive(timeout).await {
                Ok(line) => {
                    self.dispatch_line(&line);
                    timeout = Duration::ZERO;
                }
                Err(Error::Timeout) => return Ok(()),
                Err(e) => {
                    self.connection_lost(&e).await;
                    return Err(Error::ConnectionLost);
                }
            }
        }
        Ok(())
    }

    fn dispatch_line(&mut self, line: &str) {
        tracing::trace!(line, "received");
        let result = match protocol::parse_line(line) {
            Ok(Frame::Version(version)) => {
                tracing::debug!(%version, "server protocol version");
                self.protocol_version = Some(version);
                self.sequences.reset();
                Ok(())
            }
            Ok(Frame::Handle(handle)) => {
                tracing::debug!(handle = %format!("{handle:08X}"), "client handle received");
                self.handle = Some(handle);
                self.changed = true;
                self.emit(ClientEvent::Connected { handle });
                Ok(())
            }
            Ok(Frame::Response(response)) => {
                self.handle_response(response);
                Ok(())
            }
            Ok(Frame::Status(status)) => self.handle_status(&status),
            Ok(Frame::Message(text)) => {
                tracing::debug!(message = %text, "server message");
                Ok(())
            }
            Ok(Frame::Unknown(_)) => Err(Error::Protocol("unrecognised line".into())),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.malformed = self.malformed.saturating_add(1);
            tracing::debug!(line, error = %e, "dropping malformed line");
        }
    }

    fn handle_status(&mut self, status: &StatusLine) -> Result<()> {
        if self.sequences.is_stale(status.kind, status.sequence) {
            tracing::trace!(kind = %status.kind, seq = status.sequence, "dropping stale delta");
            return Ok(());
        }

        match status.kind {
            EntityKind::Call => self.apply_call(status)?,
            EntityKind::Invitation => self.apply_invitation(status)?,
            EntityKind::License => self.apply_license(status)?,
            EntityKind::RadioControl => {
                if self.radio_controls.apply(status)? {
                    self.mark(EntityKind::RadioControl, self.radio_controls.version());
                }
            }
            EntityKind::Session => {
                if self.session.apply(status.fields())? {
                    self.mark(EntityKind::Session, self.session.version());
                }
            }
            EntityKind::Headset => {
                if self.headset.apply(status.fields())? {
                    self.mark(EntityKind::Headset, self.headset.version());
                }
            }
            EntityKind::Phone => {
                if self.phone.apply(status.fields())? {
                    self.mark(EntityKind::Phone, self.phone.version());
                }
            }
            _ => self.apply_cached(status)?,
        }

        self.sequences.record(status.kind, status.sequence);
        Ok(())
    }

    fn apply_cached(&mut self, status: &StatusLine) -> Result<()> {
        let kind = status.kind;
        let applied = self.cache.apply(status)?;
        let mut changed = applied.changed;

        if let (Some(selected), Some(target)) = (applied.selected, selection_target(kind)) {
            if self.selections.entry(&target).confirm(selected.clone()) {
                // The active selection is part of the collection's state.
                if !changed {
                    self.cache.touch(kind);
                    changed = true;
                }
                self.emit(ClientEvent::SelectionChanged {
                    kind,
                    owner: None,
                    selected,
                });
            }
        }

        if kind == EntityKind::Radio {
            self.track_radio_net(status)?;
        }

        if changed {
            if let Some(version) = self.cache.version(kind) {
                self.mark(kind, version);
            }
        }
        Ok(())
    }

    /// Keep each radio's net triad in step with its record.
    fn track_radio_net(&mut self, status: &StatusLine) -> Result<()> {
        match status.change() {
            Change::Remove => {
                if let Some(radio) = &status.target {
                    self.selections.forget_radio(radio);
                }
            }
            Change::Clear => self.selections.forget_radios(),
            Change::Upsert if status.param("net").is_some() => {
                let radio = status.target_id()?;
                let net = self
                    .cache
                    .radios
                    .get(radio.as_str())
                    .and_then(|r| r.net.clone());
                let target = SelectionTarget::RadioNet(radio.clone());
                if self.selections.entry(&target).confirm(net.clone()) {
                    self.emit(ClientEvent::SelectionChanged {
                        kind: EntityKind::Radio,
                        owner: Some(radio),
                        selected: net,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_call(&mut self, status: &StatusLine) -> Result<()> {
        let before = self.calls.version();
        let update = self.calls.apply(status)?;
        if self.calls.version() != before {
            self.mark(EntityKind::Call, self.calls.version());
        }
        if let Some(update) = update {
            tracing::debug!(
                call = %update.call,
                endpoint = %update.endpoint,
                progress = %update.progress,
                "endpoint progress"
            );
            self.emit(ClientEvent::EndpointChanged {
                call: update.call,
                endpoint: update.endpoint,
                progress: update.progress,
            });
        }
        Ok(())
    }

    fn apply_invitation(&mut self, status: &StatusLine) -> Result<()> {
        let invitation = self.calls.push_invitation(status)?;
        tracing::debug!(call = %invitation.call, from = %invitation.from, "invitation received");
        self.mark(EntityKind::Invitation, self.calls.invitation_version());
        self.emit(ClientEvent::InvitationReceived {
            call: invitation.call,
        });
        Ok(())
    }

    fn apply_license(&mut self, status: &StatusLine) -> Result<()> {
        if let Some((request_id, new_status)) = self.licenses.apply(status)? {
            self.mark(EntityKind::License, self.licenses.version());
            self.emit(ClientEvent::LicenseChanged {
                request_id,
                status: new_status,
            });
        }
        Ok(())
    }

    fn handle_response(&mut self, response: Response) {
        let seq = response.sequence;
        let awaited = self.correlator.is_awaited(seq);
        let Some(kind) = self.correlator.resolve(&response) else {
            tracing::trace!(seq, "response for unknown or expired sequence");
            return;
        };
        tracing::trace!(seq, code = response.code, "response received");

        match kind {
            PendingKind::Plain => {
                if !response.is_ok() {
                    tracing::debug!(
                        seq,
                        code = %format!("0x{:08X}", response.code),
                        message = %response.data,
                        "command rejected"
                    );
                }
            }
            PendingKind::Selection(target) => {
                if !response.is_ok() {
                    tracing::debug!(seq, ?target, message = %response.data, "selection rejected");
                    let reverted = self
                        .selections
                        .get_mut(&target)
                        .is_some_and(|triad| triad.reject(seq));
                    if reverted {
                        self.changed = true;
                        self.emit_reverted(&target);
                    }
                }
            }
            PendingKind::RadioControlSet => {
                let error = if response.is_ok() {
                    String::new()
                } else if response.data.is_empty() {
                    format!("error 0x{:08X}", response.code)
                } else {
                    response.data.clone()
                };
                let version = self.radio_controls.record_result(error.clone());
                self.changed = true;
                self.emit(ClientEvent::RadioControlResult { error, version });
            }
            PendingKind::CallCreate => {
                if !response.is_ok() {
                    return;
                }
                match Id::parse(&response.data) {
                    // Nobody is waiting on a late reply; the call shows up
                    // once the server reports its endpoints.
                    Ok(call) if !awaited => {
                        tracing::debug!(seq, %call, "late call create response");
                    }
                    Ok(call) => {
                        let before = self.calls.version();
                        let expires = std::time::Instant::now() + CREATED_CALL_GRACE;
                        self.calls.insert_outstanding(call, expires);
                        if self.calls.version() != before {
                            self.mark(EntityKind::Call, self.calls.version());
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "call create returned an invalid id"),
                }
            }
            PendingKind::LicenseRequest(license_type) => {
                if response.is_ok() {
                    if response.data.is_empty() {
                        tracing::warn!(license_type = %license_type, "license request returned no handle");
                    } else {
                        let request_id = self.licenses.register(&license_type, response.data);
                        let status = self
                            .licenses
                            .status(request_id)
                            .unwrap_or(LicenseStatus::Pending);
                        self.mark(EntityKind::License, self.licenses.version());
                        self.emit(ClientEvent::LicenseChanged { request_id, status });
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection loss
    // -----------------------------------------------------------------------

    async fn connection_lost(&mut self, cause: &Error) {
        tracing::debug!(error = %cause, "transport lost");
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::trace!(error = %e, "closing lost transport failed");
            }
        }
        self.reset_mirror();
    }

    /// Empty the mirror after the transport went away.
    ///
    /// Pending selections revert first, then every collection is cleared.
    /// Versions keep counting so hosts polling them see the change.
    fn reset_mirror(&mut self) {
        for (seq, kind) in self.correlator.drain() {
            tracing::trace!(seq, ?kind, "dropping outstanding command");
        }

        for target in self.selections.revert_all() {
            self.emit_reverted(&target);
        }
        for kind in self.cache.reset() {
            if let Some(version) = self.cache.version(kind) {
                self.mark(kind, version);
            }
        }
        for target in [
            SelectionTarget::Role,
            SelectionTarget::EntityState,
            SelectionTarget::Cloud,
        ] {
            if self.selections.entry(&target).confirm(None) {
                let (kind, owner) = target.describe();
                self.emit(ClientEvent::SelectionChanged {
                    kind,
                    owner,
                    selected: None,
                });
            }
        }
        self.selections.forget_radios();

        if self.calls.reset() {
            self.mark(EntityKind::Call, self.calls.version());
        }
        if self.radio_controls.reset() {
            self.mark(EntityKind::RadioControl, self.radio_controls.version());
        }
        let lost = self.licenses.lose_all();
        if !lost.is_empty() {
            self.mark(EntityKind::License, self.licenses.version());
        }
        for request_id in lost {
            self.emit(ClientEvent::LicenseChanged {
                request_id,
                status: LicenseStatus::Lost,
            });
        }
        if self.session.reset() {
            self.mark(EntityKind::Session, self.session.version());
        }
        if self.headset.reset() {
            self.mark(EntityKind::Headset, self.headset.version());
        }
        if self.phone.reset() {
            self.mark(EntityKind::Phone, self.phone.version());
        }

        self.software_ptt.clear();
        self.sequences.reset();
        self.handle = None;
        self.protocol_version = None;
        self.changed = true;
        self.emit(ClientEvent::Disconnected);
    }

    // -----------------------------------------------------------------------
    // Command plumbing
    // -----------------------------------------------------------------------

    /// Send a command and track it. Fails fast without a live transport.
    async fn send_command(&mut self, command: &str, kind: PendingKind, blocking: bool) -> Result<u32> {
        let transport = match self.transport.as_mut() {
            Some(t) if t.is_connected() => t,
            _ => return Err(Error::NotConnected),
        };

        let seq = self.correlator.next_seq();
        let line = protocol::encode_command(seq, command);
        tracing::trace!(seq, command, "sending command");

        if let Err(e) = transport.send(&line).await {
            tracing::debug!(seq, error = %e, "send failed");
            let lost = !transport.is_connected();
            if lost {
                self.connection_lost(&e).await;
            }
            return Err(e);
        }

        self.correlator.register(seq, kind, blocking);
        Ok(seq)
    }

    /// Send a fire-and-forget command.
    ///
    /// Failures are logged, never returned; the outcome shows up in the
    /// mirror. Returns the sequence number when the command was sent.
    pub(crate) async fn fire(&mut self, command: &str, kind: PendingKind) -> Option<u32> {
        match self.send_command(command, kind, false).await {
            Ok(seq) => Some(seq),
            Err(e) => {
                tracing::debug!(command, error = %e, "command not sent");
                None
            }
        }
    }

    /// Send a command and pump until its response arrives.
    ///
    /// The response is returned whatever its result code; side effects of
    /// the command kind have already been applied by then.
    pub(crate) async fn round_trip(&mut self, command: &str, kind: PendingKind) -> Result<Response> {
        let seq = self.send_command(command, kind, true).await?;
        self.await_response(seq).await
    }

    /// Send a command whose response will be awaited with
    /// [`await_response`](Self::await_response).
    pub(crate) async fn send_blocking(&mut self, command: &str, kind: PendingKind) -> Result<u32> {
        self.send_command(command, kind, true).await
    }

    /// Pump until the response to `seq` arrives, the transport is lost, or
    /// the command timeout elapses.
    pub(crate) async fn await_response(&mut self, seq: u32) -> Result<Response> {
        let deadline = Instant::now() + self.options.command_timeout;

        loop {
            if let Some(response) = self.correlator.take_completed(seq) {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(seq, "timed out waiting for response");
                self.correlator.stop_waiting(seq);
                return Err(Error::Timeout);
            }
            let wait = (deadline - now).min(self.options.poll_interval);
            if self.pump(wait).await.is_err() {
                // The response may have arrived just before the loss.
                return self
                    .correlator
                    .take_completed(seq)
                    .ok_or(Error::ConnectionLost);
            }
        }
    }

    /// Optimistically request a selection, then send the command carrying it.
    pub(crate) async fn request_selection(
        &mut self,
        target: SelectionTarget,
        value: Option<Id>,
        command: &str,
    ) {
        self.selections.entry(&target).request(value);
        match self
            .fire(command, PendingKind::Selection(target.clone()))
            .await
        {
            Some(seq) => self.selections.entry(&target).attach(seq),
            None => self.revert_selection(&target),
        }
    }

    pub(crate) fn revert_selection(&mut self, target: &SelectionTarget) {
        if self
            .selections
            .get_mut(target)
            .is_some_and(|triad| triad.revert())
        {
            self.emit_reverted(target);
        }
    }

    fn emit_reverted(&self, target: &SelectionTarget) {
        let (kind, owner) = target.describe();
        self.emit(ClientEvent::SelectionReverted { kind, owner });
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Record a collection change and publish it.
    fn mark(&mut self, kind: EntityKind, version: u32) {
        self.changed = true;
        self.emit(ClientEvent::CollectionChanged { kind, version });
    }

    // -----------------------------------------------------------------------
    // Mirror access
    // -----------------------------------------------------------------------

    /// Version counter of any mirrored collection or singleton.
    pub fn version(&self, kind: EntityKind) -> u32 {
        match kind {
            EntityKind::Call => self.calls.version(),
            EntityKind::Invitation => self.calls.invitation_version(),
            EntityKind::License => self.licenses.version(),
            EntityKind::RadioControl => self.radio_controls.version(),
            EntityKind::Session => self.session.version(),
            EntityKind::Headset => self.headset.version(),
            EntityKind::Phone => self.phone.version(),
            other => self.cache.version(other).unwrap_or(0),
        }
    }

    pub fn roles(&self) -> &Collection<Role> {
        &self.cache.roles
    }

    pub fn entity_states(&self) -> &Collection<EntityState> {
        &self.cache.entity_states
    }

    pub fn radios(&self) -> &Collection<Radio> {
        &self.cache.radios
    }

    /// Every net known to the client. Radios and jammers reference these by id.
    pub fn nets(&self) -> &Collection<Net> {
        &self.cache.nets
    }

    pub fn jammers(&self) -> &Collection<Jammer> {
        &self.cache.jammers
    }

    pub fn radio_effects(&self) -> &Collection<RadioEffect> {
        &self.cache.radio_effects
    }

    pub fn clouds(&self) -> &Collection<Cloud> {
        &self.cache.clouds
    }

    pub fn operators(&self) -> &Collection<Operator> {
        &self.cache.operators
    }

    pub fn playsounds(&self) -> &Collection<Playsound> {
        &self.cache.playsounds
    }

    pub fn joysticks(&self) -> &Collection<Joystick> {
        &self.cache.joysticks
    }

    /// Calls, endpoints and the invitation inbox.
    pub fn calls(&self) -> &CallTable {
        &self.calls
    }

    pub fn radio_controls(&self) -> &RadioControlTable {
        &self.radio_controls
    }

    pub fn licenses(&self) -> &LicenseTable {
        &self.licenses
    }

    pub fn session(&self) -> &Session {
        self.session.get()
    }

    pub fn headset(&self) -> &Headset {
        self.headset.get()
    }

    pub fn phone(&self) -> &Phone {
        self.phone.get()
    }

    /// Set/active state of every selection.
    pub fn selections(&self) -> &Selections {
        &self.selections
    }
}

/// The triad confirmed by a selection line for this kind.
fn selection_target(kind: EntityKind) -> Option<SelectionTarget> {
    match kind {
        EntityKind::Role => Some(SelectionTarget::Role),
        EntityKind::EntityState => Some(SelectionTarget::EntityState),
        EntityKind::Cloud => Some(SelectionTarget::Cloud),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connected, ROLE1, ROLE2};
    use vrc_test_harness::MockTransport;

    #[tokio::test]
    async fn handshake_registers_program_name() {
        let mock = MockTransport::new();
        let server = mock.handle();
        server.greet(0xBEEF);
        let mut client = crate::VrcClientBuilder::new()
            .client_name("console test")
            .build_with_transport(Box::new(mock));

        assert_eq!(client.wait_for_handshake().await.unwrap(), 0xBEEF);
        assert_eq!(client.handle(), Some(0xBEEF));
        assert_eq!(client.protocol_version().unwrap().major, 1);
        assert_eq!(
            server.sent_commands(),
            vec!["client program console%20test".to_string()]
        );
    }

    #[tokio::test]
    async fn handshake_times_out() {
        let mock = MockTransport::new();
        let mut client = crate::VrcClientBuilder::new()
            .handshake_timeout(Duration::from_millis(20))
            .build_with_transport(Box::new(mock));
        assert!(matches!(
            client.wait_for_handshake().await.unwrap_err(),
            Error::Timeout
        ));
    }

    #[tokio::test]
    async fn update_reports_changes_once() {
        let (mut client, server) = connected().await;
        assert!(!client.update().await);

        server.push_line(format!("S1|role {ROLE1} name=Pilot"));
        assert!(client.update().await);
        assert!(!client.update().await);
        assert_eq!(client.roles().get(ROLE1).unwrap().name, "Pilot");
    }

    #[tokio::test]
    async fn duplicate_delta_is_idempotent() {
        let (mut client, server) = connected().await;
        server.push_line(format!("S5|role {ROLE1} name=Pilot"));
        client.update().await;
        let v = client.version(EntityKind::Role);

        server.push_line(format!("S5|role {ROLE1} name=Copilot"));
        server.push_line(format!("S4|role {ROLE2} name=Old"));
        assert!(!client.update().await);
        assert_eq!(client.version(EntityKind::Role), v);
        assert_eq!(client.roles().get(ROLE1).unwrap().name, "Pilot");
        assert!(client.roles().get(ROLE2).is_none());
    }

    #[tokio::test]
    async fn new_handshake_resets_sequence_watermarks() {
        let (mut client, server) = connected().await;
        server.push_line(format!("S9|role {ROLE1} name=Pilot"));
        client.update().await;

        server.push_lines([
            "V1.0.0".to_string(),
            format!("S1|role {ROLE1} name=Gunner"),
        ]);
        client.update().await;
        assert_eq!(client.roles().get(ROLE1).unwrap().name, "Gunner");
    }

    #[tokio::test]
    async fn malformed_lines_are_counted_not_applied() {
        let (mut client, server) = connected().await;
        server.push_lines([
            format!("S1|role {ROLE1} name=Pilot"),
            format!("S2|role {ROLE1} name=X autotune=maybe"),
            "S3|spaceship abc".to_string(),
            "garbage".to_string(),
            "R|x".to_string(),
        ]);
        client.update().await;
        assert_eq!(client.malformed_count(), 4);
        assert_eq!(client.roles().get(ROLE1).unwrap().name, "Pilot");
        assert_eq!(client.version(EntityKind::Role), 1);
    }

    #[tokio::test]
    async fn versions_never_decrease() {
        let (mut client, server) = connected().await;
        let mut last = client.version(EntityKind::Role);
        for (seq, line) in [
            format!("role {ROLE1} name=A"),
            format!("role {ROLE2} name=B"),
            format!("role {ROLE1} name=A"),
            format!("role {ROLE1} removed=1"),
            "role clear=1".to_string(),
        ]
        .iter()
        .enumerate()
        {
            server.push_line(format!("S{}|{line}", seq + 1));
            client.update().await;
            let v = client.version(EntityKind::Role);
            assert!(v >= last);
            last = v;
        }
        assert_eq!(last, 4);
    }

    #[tokio::test]
    async fn events_are_published() {
        let (mut client, server) = connected().await;
        let mut events = client.subscribe();
        server.push_line(format!("S1|role {ROLE1} name=Pilot"));
        client.update().await;
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::CollectionChanged {
                kind: EntityKind::Role,
                version: 1
            }
        );
    }

    #[tokio::test]
    async fn connection_loss_empties_mirror() {
        let (mut client, server) = connected().await;
        let mut events = client.subscribe();
        server.push_lines([
            format!("S1|role {ROLE1} name=Pilot"),
            format!("S2|role {ROLE1} active=1"),
        ]);
        client.update().await;
        let v = client.version(EntityKind::Role);

        server.disconnect();
        assert!(client.update().await);
        assert!(!client.is_connected());
        assert!(client.roles().is_empty());
        assert!(client.version(EntityKind::Role) > v);
        assert_eq!(
            client.selections().get(&SelectionTarget::Role).unwrap().active_value(),
            &None
        );

        let mut saw_disconnect = false;
        while let Ok(event) = events.try_recv() {
            saw_disconnect |= event == ClientEvent::Disconnected;
        }
        assert!(saw_disconnect);
    }

    #[tokio::test]
    async fn lines_queued_before_loss_are_applied() {
        let (mut client, server) = connected().await;
        server.push_line(format!("S1|role {ROLE1} name=Pilot"));
        server.disconnect();
        client.update().await;
        // Applied, then torn down with the rest of the mirror.
        assert_eq!(client.version(EntityKind::Role), 2);
    }

    #[tokio::test]
    async fn no_transport_update_is_quiet() {
        let mut client = crate::VrcClientBuilder::new().build();
        assert!(!client.update().await);
        assert!(!client.is_connected());
        assert!(client.close().await.is_ok());
    }

    #[tokio::test]
    async fn close_disconnects() {
        let (mut client, server) = connected().await;
        client.close().await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.handle(), None);
        server.push_line(format!("S1|role {ROLE1} name=Pilot"));
        client.update().await;
        assert!(client.roles().is_empty());
    }
}
