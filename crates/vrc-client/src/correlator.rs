//! Command sequence numbering and response correlation.
//!
//! Every command sent to the server carries a sequence number. The
//! [`Correlator`] remembers what each outstanding command was for, so the
//! update pump knows what to do when its response arrives: revert a
//! selection, record a live-radio-control error, register a new call, and so
//! on. Responses for blocking commands are additionally parked until the
//! waiting operation collects them.

use std::collections::{HashMap, VecDeque};

use vrc_core::protocol::Response;

use crate::triad::SelectionTarget;

/// Outstanding commands kept before the oldest is forgotten.
const MAX_PENDING: usize = 1024;

/// What to do with a command's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingKind {
    /// Nothing beyond logging a rejection.
    Plain,
    /// A selection request; a rejection reverts the triad.
    Selection(SelectionTarget),
    /// A live-radio-control set; the outcome feeds the error channel.
    RadioControlSet,
    /// `call create`; the response data is the new call id.
    CallCreate,
    /// `license request`; the response data is the server handle.
    LicenseRequest(String),
}

#[derive(Debug)]
struct Pending {
    kind: PendingKind,
    /// Whether an operation is waiting for the response.
    blocking: bool,
}

/// Tracks commands awaiting a response.
#[derive(Debug)]
pub(crate) struct Correlator {
    next_seq: u32,
    pending: HashMap<u32, Pending>,
    /// Sequence numbers in send order, for eviction.
    order: VecDeque<u32>,
    completed: HashMap<u32, Response>,
}

impl Default for Correlator {
    fn default() -> Self {
        Correlator {
            next_seq: 1,
            pending: HashMap::new(),
            order: VecDeque::new(),
            completed: HashMap::new(),
        }
    }
}

impl Correlator {
    /// Allocate the next sequence number. Zero is never used.
    pub(crate) fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.checked_add(1).unwrap_or(1);
        seq
    }

    /// Track a sent command.
    pub(crate) fn register(&mut self, seq: u32, kind: PendingKind, blocking: bool) {
        if self.pending.len() >= MAX_PENDING {
            while let Some(oldest) = self.order.pop_front() {
                if let Some(evicted) = self.pending.remove(&oldest) {
                    tracing::warn!(seq = oldest, kind = ?evicted.kind, "no response, forgetting command");
                    break;
                }
            }
        }
        self.pending.insert(seq, Pending { kind, blocking });
        self.order.push_back(seq);
    }

    /// Match a response to its command.
    ///
    /// Returns the command's kind, or `None` for an unknown sequence number.
    /// Responses to blocking commands are kept for [`take_completed`](Self::take_completed).
    pub(crate) fn resolve(&mut self, response: &Response) -> Option<PendingKind> {
        let pending = self.pending.remove(&response.sequence)?;
        if let Some(i) = self.order.iter().position(|&s| s == response.sequence) {
            self.order.remove(i);
        }
        if pending.blocking {
            self.completed.insert(response.sequence, response.clone());
        }
        Some(pending.kind)
    }

    /// Whether an operation is still waiting for the response to `seq`.
    pub(crate) fn is_awaited(&self, seq: u32) -> bool {
        self.pending.get(&seq).is_some_and(|p| p.blocking)
    }

    /// Collect the response to a blocking command, if it has arrived.
    pub(crate) fn take_completed(&mut self, seq: u32) -> Option<Response> {
        self.completed.remove(&seq)
    }

    /// Stop waiting for a blocking command (timed out).
    ///
    /// The command stays tracked so a late response still has its effect.
    pub(crate) fn stop_waiting(&mut self, seq: u32) {
        if let Some(pending) = self.pending.get_mut(&seq) {
            pending.blocking = false;
        }
        self.completed.remove(&seq);
    }

    /// Forget every outstanding command (connection lost).
    ///
    /// Responses already parked for a waiting operation are kept.
    pub(crate) fn drain(&mut self) -> Vec<(u32, PendingKind)> {
        self.order.clear();
        self.pending
            .drain()
            .map(|(seq, pending)| (seq, pending.kind))
            .collect()
    }

    /// Number of commands awaiting a response.
    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
