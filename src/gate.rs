//! The "god scheduler": `DeferredConnectionGate`, spec §4.2.
//!
//! Interposes on every controller↔switch connection. Inbound and outbound
//! messages are both buffered as pending items rather than delivered
//! directly; `InternalEvent::proceed` asks the gate "has the recorded
//! message M arrived?" and, on a match, releases exactly that item.

use std::collections::VecDeque;

use crate::event::Fingerprint;

/// A connection's stable identity: `(dpid, cid)`, i.e. "this switch talking
/// to this controller". `ConnectionId` rather than a raw connection handle,
/// per the design note in spec §9 on cyclic references: the gate owns a
/// registry keyed by identity, not a mutable back-reference into the
/// connection object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub dpid: u64,
    pub cid_hash: u64,
}

impl ConnectionId {
    pub fn new(dpid: u64, cid: &str) -> ConnectionId {
        use std::hash::{Hash, Hasher};
        let mut h = std::collections::hash_map::DefaultHasher::new();
        cid.hash(&mut h);
        ConnectionId {
            dpid,
            cid_hash: h.finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub dpid: u64,
    pub cid: String,
    pub message_fingerprint: String,
}

impl PendingItem {
    fn matches(&self, fp: &Fingerprint) -> bool {
        match fp {
            Fingerprint::PendingMessage {
                dpid,
                cid,
                message_fingerprint,
            } => self.dpid == *dpid && &self.cid == cid && &self.message_fingerprint == message_fingerprint,
            Fingerprint::ControllerStateChange { .. } => false,
        }
    }
}

/// `(dpid, cid, state)` for a matched controller-internal state change, as
/// opposed to a buffered wire message (spec §3: `Fingerprint`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub cid: String,
    pub state: String,
}

impl StateChange {
    fn matches(&self, fp: &Fingerprint) -> bool {
        match fp {
            Fingerprint::ControllerStateChange { cid, state } => &self.cid == cid && &self.state == state,
            Fingerprint::PendingMessage { .. } => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeferredConnectionGate {
    pending_receives: VecDeque<PendingItem>,
    pending_sends: VecDeque<PendingItem>,
    /// Controller-internal state changes observed since the last release;
    /// these aren't "released" anywhere (there's no wire delivery to defer),
    /// they're simply consumed by a matching `InternalEvent`.
    observed_state_changes: VecDeque<StateChange>,
}

impl DeferredConnectionGate {
    pub fn new() -> DeferredConnectionGate {
        DeferredConnectionGate::default()
    }

    /// Called by the collaborator on inbound message from a controller:
    /// instead of delivering to the switch, queue it.
    pub fn insert_pending_receipt(&mut self, dpid: u64, cid: String, message_fingerprint: String) {
        self.pending_receives.push_back(PendingItem {
            dpid,
            cid,
            message_fingerprint,
        });
    }

    /// Symmetric for outbound switch -> controller sends.
    pub fn insert_pending_send(&mut self, dpid: u64, cid: String, message_fingerprint: String) {
        self.pending_sends.push_back(PendingItem {
            dpid,
            cid,
            message_fingerprint,
        });
    }

    pub fn observe_state_change(&mut self, cid: String, state: String) {
        self.observed_state_changes.push_back(StateChange { cid, state });
    }

    /// Snapshot of the receive queue for matching against a `.unacked`
    /// buffer (spec §6, §4.7 "new internal events" accounting).
    pub fn pending_receives(&self) -> impl Iterator<Item = &PendingItem> {
        self.pending_receives.iter()
    }

    pub fn pending_sends(&self) -> impl Iterator<Item = &PendingItem> {
        self.pending_sends.iter()
    }

    /// True iff some pending item (receive, send, or observed state change)
    /// matches `fp`; if so, that single item is released/consumed. A given
    /// fingerprint matches at most once per call (spec §5).
    pub fn try_match_and_release(&mut self, fp: &Fingerprint) -> bool {
        if let Some(pos) = self.pending_receives.iter().position(|p| p.matches(fp)) {
            self.pending_receives.remove(pos);
            return true;
        }
        if let Some(pos) = self.pending_sends.iter().position(|p| p.matches(fp)) {
            self.pending_sends.remove(pos);
            return true;
        }
        if let Some(pos) = self
            .observed_state_changes
            .iter()
            .position(|s| s.matches(fp))
        {
            self.observed_state_changes.remove(pos);
            return true;
        }
        false
    }

    /// Discards all pending items, e.g. on `Simulation::clean_up` (spec §5).
    pub fn clear(&mut self) {
        self.pending_receives.clear();
        self.pending_sends.clear();
        self.observed_state_changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_and_releases_exactly_one_item() {
        let mut gate = DeferredConnectionGate::new();
        gate.insert_pending_receipt(1, "c1".into(), "fp-a".into());
        gate.insert_pending_receipt(1, "c1".into(), "fp-a".into());

        let fp = Fingerprint::PendingMessage {
            dpid: 1,
            cid: "c1".into(),
            message_fingerprint: "fp-a".into(),
        };
        assert!(gate.try_match_and_release(&fp));
        assert_eq!(gate.pending_receives().count(), 1);
        assert!(gate.try_match_and_release(&fp));
        assert_eq!(gate.pending_receives().count(), 0);
        assert!(!gate.try_match_and_release(&fp));
    }

    #[test]
    fn state_change_fingerprint_does_not_match_pending_message() {
        let mut gate = DeferredConnectionGate::new();
        gate.insert_pending_receipt(1, "c1".into(), "fp-a".into());
        let fp = Fingerprint::ControllerStateChange {
            cid: "c1".into(),
            state: "MASTER".into(),
        };
        assert!(!gate.try_match_and_release(&fp));
    }

    #[test]
    fn clear_discards_all_pending_items() {
        let mut gate = DeferredConnectionGate::new();
        gate.insert_pending_receipt(1, "c1".into(), "fp-a".into());
        gate.insert_pending_send(1, "c1".into(), "fp-b".into());
        gate.observe_state_change("c1".into(), "MASTER".into());
        gate.clear();
        assert_eq!(gate.pending_receives().count(), 0);
        assert_eq!(gate.pending_sends().count(), 0);
    }
}
