//! Call signaling state machine and invitation inbox.
//!
//! Calls and their endpoint memberships change only in response to server
//! status lines of the form
//!
//! ```text
//! S<seq>|call <call_id> endpoint=<endpoint_id> state=<progress> [reason=<leave_reason>]
//! S<seq>|call <call_id> removed=1
//! S<seq>|invitation call=<call_id> from=<endpoint_id> to=<endpoint_id> [dial=<number>]
//! ```
//!
//! Endpoints that reach a terminal state (`ended`, `rejected`, `timeout`)
//! stay visible until the next [`sweep`](CallTable::sweep), which the client
//! runs at the start of each update cycle. A call is dropped once it has no
//! endpoints left. A call this client just created is kept while empty until
//! the server populates it or its grace period runs out.

use std::time::Instant;

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{parse_enum, Change, StatusLine};
use vrc_core::{CallProgress, Id, LeaveReason};

/// An endpoint's membership in a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: Id,
    pub progress: CallProgress,
    /// Why the endpoint left, once it has.
    pub reason: Option<LeaveReason>,
}

/// A call and its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: Id,
    pub endpoints: Vec<Endpoint>,
    /// Created locally and not yet populated by the server.
    pub outstanding: bool,
    /// When an unpopulated, locally created call may be swept.
    expires: Option<Instant>,
}

impl Call {
    fn new(id: Id) -> Self {
        Call {
            id,
            endpoints: Vec::new(),
            outstanding: false,
            expires: None,
        }
    }

    /// Look up an endpoint.
    pub fn endpoint(&self, endpoint: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id.as_str() == endpoint)
    }
}

/// An endpoint transition applied from a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUpdate {
    pub call: Id,
    pub endpoint: Id,
    pub progress: CallProgress,
}

/// A one-way offer for an endpoint to join a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub call: Id,
    pub from: Id,
    pub to: Id,
    pub dial_number: Option<String>,
}

/// All known calls plus the invitation inbox.
#[derive(Debug, Clone, Default)]
pub struct CallTable {
    calls: Vec<Call>,
    version: u32,
    invitations: Vec<Invitation>,
    invitation_version: u32,
}

impl CallTable {
    /// Change counter covering calls and their endpoints.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of calls.
    pub fn count(&self) -> usize {
        self.calls.len()
    }

    /// Look up a call.
    pub fn get(&self, call: &str) -> Option<&Call> {
        self.calls.iter().find(|c| c.id.as_str() == call)
    }

    /// Iterate calls.
    pub fn iter(&self) -> std::slice::Iter<'_, Call> {
        self.calls.iter()
    }

    /// Cursor access: the first call id.
    pub fn first(&self) -> Option<&Id> {
        self.calls.first().map(|c| &c.id)
    }

    /// Cursor access: the call id after `prev`.
    pub fn next(&self, prev: &str) -> Option<&Id> {
        let i = self.calls.iter().position(|c| c.id.as_str() == prev)?;
        self.calls.get(i + 1).map(|c| &c.id)
    }

    /// Cursor access: the first endpoint of a call.
    pub fn endpoint_first(&self, call: &str) -> Option<&Id> {
        self.get(call)?.endpoints.first().map(|e| &e.id)
    }

    /// Cursor access: the endpoint after `prev` in a call.
    pub fn endpoint_next(&self, call: &str, prev: &str) -> Option<&Id> {
        let endpoints = &self.get(call)?.endpoints;
        let i = endpoints.iter().position(|e| e.id.as_str() == prev)?;
        endpoints.get(i + 1).map(|e| &e.id)
    }

    /// Progress state of an endpoint within a call.
    pub fn endpoint_state(&self, call: &str, endpoint: &str) -> Option<CallProgress> {
        self.get(call)?.endpoint(endpoint).map(|e| e.progress)
    }

    /// Register a call created by this client. It survives with no
    /// endpoints until the server populates it or `expires` passes.
    ///
    /// A call the server already populated is left as it is.
    pub(crate) fn insert_outstanding(&mut self, id: Id, expires: Instant) {
        if self.get(id.as_str()).is_some() {
            return;
        }
        let mut call = Call::new(id);
        call.outstanding = true;
        call.expires = Some(expires);
        self.calls.push(call);
        self.bump();
    }

    /// Apply a `call` status line.
    ///
    /// Illegal transitions fail as protocol errors and leave the table
    /// untouched. Returns the endpoint transition, if any.
    pub(crate) fn apply(&mut self, status: &StatusLine) -> Result<Option<EndpointUpdate>> {
        match status.change() {
            Change::Remove => {
                let id = status.target_id()?;
                if let Some(i) = self.calls.iter().position(|c| c.id == id) {
                    self.calls.remove(i);
                    self.bump();
                }
                return Ok(None);
            }
            Change::Clear => {
                if !self.calls.is_empty() {
                    self.calls.clear();
                    self.bump();
                }
                return Ok(None);
            }
            Change::Select => {
                return Err(Error::Protocol("call does not support selection".into()));
            }
            Change::Upsert => {}
        }

        let call_id = status.target_id()?;
        let endpoint_id = Id::parse(status.param("endpoint").ok_or_else(|| {
            Error::Protocol(format!("call {call_id} status missing endpoint"))
        })?)?;
        let progress: CallProgress = parse_enum(
            "state",
            status
                .param("state")
                .ok_or_else(|| Error::Protocol(format!("call {call_id} status missing state")))?,
        )?;
        let reason: Option<LeaveReason> = status
            .param("reason")
            .map(|r| parse_enum("reason", r))
            .transpose()?;

        let existing = self
            .get(call_id.as_str())
            .and_then(|c| c.endpoint(endpoint_id.as_str()))
            .cloned();

        if let Some(current) = &existing {
            if !current.progress.can_transition_to(progress) {
                return Err(Error::Protocol(format!(
                    "illegal endpoint transition {} -> {} in call {call_id}",
                    current.progress, progress
                )));
            }
            if current.progress == progress && (reason.is_none() || current.reason == reason) {
                return Ok(None);
            }
        }

        let index = match self.calls.iter().position(|c| c.id == call_id) {
            Some(i) => i,
            None => {
                self.calls.push(Call::new(call_id.clone()));
                self.calls.len() - 1
            }
        };
        let call = &mut self.calls[index];
        call.outstanding = false;
        call.expires = None;
        match call.endpoints.iter_mut().find(|e| e.id == endpoint_id) {
            Some(endpoint) => {
                endpoint.progress = progress;
                if reason.is_some() {
                    endpoint.reason = reason;
                }
            }
            None => call.endpoints.push(Endpoint {
                id: endpoint_id.clone(),
                progress,
                reason,
            }),
        }
        self.bump();

        Ok(Some(EndpointUpdate {
            call: call_id,
            endpoint: endpoint_id,
            progress,
        }))
    }

    /// Drop terminal endpoints and calls left empty.
    ///
    /// An unpopulated call created locally is kept until its grace period
    /// has passed at `now`. Returns whether anything was removed.
    pub(crate) fn sweep(&mut self, now: Instant) -> bool {
        let before: usize = self.calls.iter().map(|c| c.endpoints.len() + 1).sum();
        for call in &mut self.calls {
            call.endpoints.retain(|e| !e.progress.is_terminal());
        }
        self.calls.retain(|c| {
            !c.endpoints.is_empty() || c.expires.is_some_and(|expires| now < expires)
        });
        let after: usize = self.calls.iter().map(|c| c.endpoints.len() + 1).sum();

        let removed = after != before;
        if removed {
            self.bump();
        }
        removed
    }

    /// Forget every call (connection lost).
    pub(crate) fn reset(&mut self) -> bool {
        if self.calls.is_empty() {
            return false;
        }
        self.calls.clear();
        self.bump();
        true
    }

    // -- Invitations ----------------------------------------------------------

    /// The invitation inbox, oldest first.
    pub fn invitations(&self) -> &[Invitation] {
        &self.invitations
    }

    /// Change counter for the invitation inbox.
    pub fn invitation_version(&self) -> u32 {
        self.invitation_version
    }

    /// Append an invitation from an `invitation` status line.
    pub(crate) fn push_invitation(&mut self, status: &StatusLine) -> Result<Invitation> {
        let field = |key: &str| -> Result<Id> {
            let value = status
                .param(key)
                .ok_or_else(|| Error::Protocol(format!("invitation missing {key}")))?;
            Id::parse(value)
        };
        let invitation = Invitation {
            call: field("call")?,
            from: field("from")?,
            to: field("to")?,
            dial_number: status
                .param("dial")
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        };
        self.invitations.push(invitation.clone());
        self.invitation_version = self.invitation_version.wrapping_add(1);
        Ok(invitation)
    }

    /// Empty the inbox.
    pub(crate) fn clear_invitations(&mut self) {
        self.invitations.clear();
        self.invitation_version = self.invitation_version.wrapping_add(1);
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use vrc_core::protocol::{parse_line, Frame};

    const CALL: &str = "CALL0000000000000000000000000001";
    const EP1: &str = "EP010000000000000000000000000001";
    const EP2: &str = "EP020000000000000000000000000002";

    fn status(line: &str) -> StatusLine {
        match parse_line(line).unwrap() {
            Frame::Status(s) => s,
            other => panic!("not a status line: {other:?}"),
        }
    }

    fn endpoint_line(seq: u32, ep: &str, state: &str) -> StatusLine {
        status(&format!("S{seq}|call {CALL} endpoint={ep} state={state}"))
    }

    #[test]
    fn outstanding_call_is_visible_before_server_populates_it() {
        let mut table = CallTable::default();
        let now = Instant::now();
        table.insert_outstanding(Id::parse(CALL).unwrap(), now + Duration::from_secs(2));
        assert_eq!(table.first().map(Id::as_str), Some(CALL));
        assert!(table.endpoint_first(CALL).is_none());

        // Sweeping does not drop an outstanding call inside its grace period.
        assert!(!table.sweep(now));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn unpopulated_call_expires() {
        let mut table = CallTable::default();
        let now = Instant::now();
        let v = table.version();
        table.insert_outstanding(Id::parse(CALL).unwrap(), now + Duration::from_secs(2));
        assert!(table.sweep(now + Duration::from_secs(2)));
        assert_eq!(table.count(), 0);
        assert_eq!(table.version(), v + 2);
    }

    #[test]
    fn populated_call_follows_its_endpoints() {
        let mut table = CallTable::default();
        let now = Instant::now();
        table.insert_outstanding(Id::parse(CALL).unwrap(), now + Duration::from_secs(60));
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        table.apply(&endpoint_line(2, EP1, "ended")).unwrap();

        // Joined and left: gone at the next sweep despite the grace period.
        assert!(table.sweep(now));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn create_response_after_population_keeps_endpoints() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        let v = table.version();
        table.insert_outstanding(Id::parse(CALL).unwrap(), Instant::now());
        assert_eq!(table.version(), v);
        assert!(!table.get(CALL).unwrap().outstanding);
        assert_eq!(table.endpoint_state(CALL, EP1), Some(CallProgress::Connected));
    }

    #[test]
    fn signaling_to_connected() {
        let mut table = CallTable::default();
        let update = table.apply(&endpoint_line(1, EP1, "signaling")).unwrap();
        assert_eq!(update.unwrap().progress, CallProgress::Signaling);
        let v = table.version();

        table.apply(&endpoint_line(2, EP1, "connected")).unwrap();
        assert_eq!(
            table.endpoint_state(CALL, EP1),
            Some(CallProgress::Connected)
        );
        assert_eq!(table.version(), v + 1);
        assert!(!table.get(CALL).unwrap().outstanding);
    }

    #[test]
    fn holding_round_trip() {
        let mut table = CallTable::default();
        for state in ["signaling", "connected", "holding", "connected"] {
            table.apply(&endpoint_line(1, EP1, state)).unwrap();
        }
        assert_eq!(
            table.endpoint_state(CALL, EP1),
            Some(CallProgress::Connected)
        );
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        let v = table.version();
        assert!(table.apply(&endpoint_line(2, EP1, "signaling")).is_err());
        assert_eq!(table.version(), v);
        assert_eq!(
            table.endpoint_state(CALL, EP1),
            Some(CallProgress::Connected)
        );
    }

    #[test]
    fn repeated_state_is_not_a_change() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        let v = table.version();
        assert_eq!(table.apply(&endpoint_line(2, EP1, "connected")).unwrap(), None);
        assert_eq!(table.version(), v);
    }

    #[test]
    fn terminal_endpoints_survive_until_sweep() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        table.apply(&endpoint_line(2, EP2, "signaling")).unwrap();
        table
            .apply(&status(&format!(
                "S3|call {CALL} endpoint={EP2} state=rejected reason=declined"
            )))
            .unwrap();

        let ep2 = table.get(CALL).unwrap().endpoint(EP2).unwrap();
        assert_eq!(ep2.progress, CallProgress::Rejected);
        assert_eq!(ep2.reason, Some(LeaveReason::Declined));

        assert!(table.sweep(Instant::now()));
        assert!(table.get(CALL).unwrap().endpoint(EP2).is_none());
        assert_eq!(table.endpoint_first(CALL).map(Id::as_str), Some(EP1));

        table.apply(&endpoint_line(4, EP1, "ended")).unwrap();
        assert!(table.sweep(Instant::now()));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn endpoint_cursor() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        table.apply(&endpoint_line(2, EP2, "signaling")).unwrap();

        let first = table.endpoint_first(CALL).unwrap().clone();
        let second = table.endpoint_next(CALL, first.as_str()).unwrap().clone();
        assert_eq!(first.as_str(), EP1);
        assert_eq!(second.as_str(), EP2);
        assert!(table.endpoint_next(CALL, second.as_str()).is_none());
        assert!(table.endpoint_next("nope", EP1).is_none());
    }

    #[test]
    fn missing_fields_are_malformed() {
        let mut table = CallTable::default();
        assert!(table
            .apply(&status(&format!("S1|call {CALL} state=connected")))
            .is_err());
        assert!(table
            .apply(&status(&format!("S1|call {CALL} endpoint={EP1}")))
            .is_err());
        assert!(table
            .apply(&status(&format!("S1|call {CALL} endpoint={EP1} state=dancing")))
            .is_err());
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn remove_call() {
        let mut table = CallTable::default();
        table.apply(&endpoint_line(1, EP1, "connected")).unwrap();
        table
            .apply(&status(&format!("S2|call {CALL} removed=1")))
            .unwrap();
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn invitation_inbox() {
        let mut table = CallTable::default();
        let line = status(&format!(
            "S1|invitation call={CALL} from={EP1} to={EP2} dial=5551234"
        ));
        let invitation = table.push_invitation(&line).unwrap();
        assert_eq!(invitation.dial_number.as_deref(), Some("5551234"));

        // Duplicates are kept; the host de-duplicates if it wants to.
        table.push_invitation(&line).unwrap();
        assert_eq!(table.invitations().len(), 2);
        assert_eq!(table.invitation_version(), 2);

        table.clear_invitations();
        assert!(table.invitations().is_empty());
        assert_eq!(table.invitation_version(), 3);
    }

    #[test]
    fn malformed_invitation_is_not_added() {
        let mut table = CallTable::default();
        let line = status(&format!("S1|invitation call={CALL} from={EP1}"));
        assert!(table.push_invitation(&line).is_err());
        assert_eq!(table.invitation_version(), 0);
    }
}
