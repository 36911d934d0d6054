//! Optimistic set/active tracking for user-selectable fields.
//!
//! A [`Triad`] holds the value the host last requested alongside the value
//! the server last confirmed. The two diverge only while a request is in
//! flight. A rejection, or loss of the connection, reverts the requested
//! value to the confirmed one.

use std::collections::HashMap;

use vrc_core::{EntityKind, Id};

/// Set/active state for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triad<T> {
    /// No request in flight; set and active agree.
    Confirmed(T),
    /// A request is in flight.
    Pending {
        /// Value requested locally.
        requested: T,
        /// Value last confirmed by the server.
        last_confirmed: T,
        /// Sequence number of the command carrying `requested`.
        seq: Option<u32>,
    },
}

impl<T: Default> Default for Triad<T> {
    fn default() -> Self {
        Triad::Confirmed(T::default())
    }
}

impl<T: Clone + PartialEq> Triad<T> {
    /// The most recently requested value (the "set" value).
    pub fn set_value(&self) -> &T {
        match self {
            Triad::Confirmed(v) => v,
            Triad::Pending { requested, .. } => requested,
        }
    }

    /// The value confirmed by the server (the "active" value).
    pub fn active_value(&self) -> &T {
        match self {
            Triad::Confirmed(v) => v,
            Triad::Pending { last_confirmed, .. } => last_confirmed,
        }
    }

    /// Whether a request is in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Triad::Pending { .. })
    }

    /// Record a local request. The set value changes immediately.
    pub fn request(&mut self, value: T) {
        let last_confirmed = self.active_value().clone();
        *self = Triad::Pending {
            requested: value,
            last_confirmed,
            seq: None,
        };
    }

    /// Attach the command sequence number to the in-flight request.
    pub fn attach(&mut self, command_seq: u32) {
        if let Triad::Pending { seq, .. } = self {
            *seq = Some(command_seq);
        }
    }

    /// Apply a server confirmation.
    ///
    /// Converges to `Confirmed` when the server confirmed what was requested;
    /// otherwise the request stays in flight with the new active value.
    /// Returns whether the active value changed.
    pub fn confirm(&mut self, value: T) -> bool {
        let changed = *self.active_value() != value;
        *self = match std::mem::replace(self, Triad::Confirmed(value.clone())) {
            Triad::Pending { requested, seq, .. } if requested != value => Triad::Pending {
                requested,
                last_confirmed: value,
                seq,
            },
            _ => Triad::Confirmed(value),
        };
        changed
    }

    /// Revert after the command `seq` was rejected.
    ///
    /// Rejections of superseded requests are ignored. Returns whether the
    /// set value changed.
    pub fn reject(&mut self, command_seq: u32) -> bool {
        let current = matches!(self, Triad::Pending { seq: Some(s), .. } if *s == command_seq);
        current && self.revert()
    }

    /// Revert unconditionally (connection lost). Returns whether the set
    /// value changed.
    pub fn revert(&mut self) -> bool {
        match self {
            Triad::Pending { last_confirmed, .. } => {
                *self = Triad::Confirmed(last_confirmed.clone());
                true
            }
            Triad::Confirmed(_) => false,
        }
    }
}

/// Which selection a triad tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectionTarget {
    /// The operator role.
    Role,
    /// The vehicle context.
    EntityState,
    /// The server cloud.
    Cloud,
    /// The tuned net of one radio.
    RadioNet(Id),
}

impl SelectionTarget {
    /// Entity kind and owner used in events.
    pub fn describe(&self) -> (EntityKind, Option<Id>) {
        match self {
            SelectionTarget::Role => (EntityKind::Role, None),
            SelectionTarget::EntityState => (EntityKind::EntityState, None),
            SelectionTarget::Cloud => (EntityKind::Cloud, None),
            SelectionTarget::RadioNet(radio) => (EntityKind::Radio, Some(radio.clone())),
        }
    }
}

/// All selection triads. Each is independent of the others.
#[derive(Debug, Clone, Default)]
pub struct Selections {
    role: Triad<Option<Id>>,
    entity_state: Triad<Option<Id>>,
    cloud: Triad<Option<Id>>,
    radio_nets: HashMap<Id, Triad<Option<Id>>>,
}

impl Selections {
    /// Look up a triad. Radios that were never tuned have none.
    pub fn get(&self, target: &SelectionTarget) -> Option<&Triad<Option<Id>>> {
        match target {
            SelectionTarget::Role => Some(&self.role),
            SelectionTarget::EntityState => Some(&self.entity_state),
            SelectionTarget::Cloud => Some(&self.cloud),
            SelectionTarget::RadioNet(radio) => self.radio_nets.get(radio),
        }
    }

    /// Look up a triad, creating a radio's on first use.
    pub(crate) fn entry(&mut self, target: &SelectionTarget) -> &mut Triad<Option<Id>> {
        match target {
            SelectionTarget::Role => &mut self.role,
            SelectionTarget::EntityState => &mut self.entity_state,
            SelectionTarget::Cloud => &mut self.cloud,
            SelectionTarget::RadioNet(radio) => {
                self.radio_nets.entry(radio.clone()).or_default()
            }
        }
    }

    /// Look up an existing triad for update.
    pub(crate) fn get_mut(&mut self, target: &SelectionTarget) -> Option<&mut Triad<Option<Id>>> {
        match target {
            SelectionTarget::Role => Some(&mut self.role),
            SelectionTarget::EntityState => Some(&mut self.entity_state),
            SelectionTarget::Cloud => Some(&mut self.cloud),
            SelectionTarget::RadioNet(radio) => self.radio_nets.get_mut(radio),
        }
    }

    /// Drop a removed radio's triad.
    pub(crate) fn forget_radio(&mut self, radio: &str) {
        self.radio_nets.remove(radio);
    }

    /// Drop every radio's triad.
    pub(crate) fn forget_radios(&mut self) {
        self.radio_nets.clear();
    }

    /// Revert every pending triad, returning the targets that changed.
    pub(crate) fn revert_all(&mut self) -> Vec<SelectionTarget> {
        let mut reverted = Vec::new();
        if self.role.revert() {
            reverted.push(SelectionTarget::Role);
        }
        if self.entity_state.revert() {
            reverted.push(SelectionTarget::EntityState);
        }
        if self.cloud.revert() {
            reverted.push(SelectionTarget::Cloud);
        }
        for (radio, triad) in &mut self.radio_nets {
            if triad.revert() {
                reverted.push(SelectionTarget::RadioNet(radio.clone()));
            }
        }
        reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_updates_set_only() {
        let mut t = Triad::Confirmed(1);
        t.request(2);
        assert_eq!(*t.set_value(), 2);
        assert_eq!(*t.active_value(), 1);
        assert!(t.is_pending());
    }

    #[test]
    fn matching_confirmation_converges() {
        let mut t = Triad::Confirmed(1);
        t.request(2);
        assert!(t.confirm(2));
        assert_eq!(t, Triad::Confirmed(2));
    }

    #[test]
    fn unrelated_confirmation_keeps_request_in_flight() {
        let mut t = Triad::Confirmed(1);
        t.request(2);
        t.attach(9);
        assert!(t.confirm(3));
        assert_eq!(*t.set_value(), 2);
        assert_eq!(*t.active_value(), 3);

        // The later rejection reverts to the newest confirmed value.
        assert!(t.reject(9));
        assert_eq!(t, Triad::Confirmed(3));
    }

    #[test]
    fn reject_reverts_to_active() {
        let mut t = Triad::Confirmed(1);
        t.request(2);
        t.attach(5);
        assert!(t.reject(5));
        assert_eq!(*t.set_value(), 1);
        assert!(!t.is_pending());
    }

    #[test]
    fn superseded_rejection_is_ignored() {
        let mut t = Triad::Confirmed(1);
        t.request(2);
        t.attach(5);
        t.request(3);
        t.attach(6);
        assert!(!t.reject(5));
        assert_eq!(*t.set_value(), 3);
        assert!(t.reject(6));
        assert_eq!(*t.set_value(), 1);
    }

    #[test]
    fn unsolicited_confirmation() {
        let mut t: Triad<Option<u8>> = Triad::default();
        assert!(t.confirm(Some(4)));
        assert!(!t.confirm(Some(4)));
        assert_eq!(t, Triad::Confirmed(Some(4)));
    }

    #[test]
    fn selections_are_independent() {
        let role = Id::parse("ROLE0000000000000000000000000001").unwrap();
        let mut s = Selections::default();
        s.entry(&SelectionTarget::Role).request(Some(role.clone()));
        assert!(!s.get(&SelectionTarget::EntityState).unwrap().is_pending());

        let reverted = s.revert_all();
        assert_eq!(reverted, vec![SelectionTarget::Role]);
        assert_eq!(s.get(&SelectionTarget::Role).unwrap().set_value(), &None);
    }

    #[test]
    fn radio_triads_created_on_demand() {
        let radio = Id::parse("RADIO000000000000000000000000001").unwrap();
        let target = SelectionTarget::RadioNet(radio.clone());
        let mut s = Selections::default();
        assert!(s.get(&target).is_none());
        s.entry(&target).confirm(None);
        assert!(s.get(&target).is_some());
        s.forget_radio(radio.as_str());
        assert!(s.get(&target).is_none());
    }
}
