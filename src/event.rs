//! The event data model: spec §3.
//!
//! A closed sum type replaces the source's class-name dynamic dispatch (see
//! design note in §9): each input variant carries its own fingerprint
//! fields, and the wire-format tag ↔ variant mapping lives in
//! [`crate::trace`], not here.

use crate::{sim::Simulation, time::Timestamp};

pub type Label = String;

/// Variant-specific fields for each `InputEvent` kind named in spec §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    SwitchFailure { dpid: u64 },
    SwitchRecovery { dpid: u64 },
    LinkFailure {
        start_dpid: u64,
        start_port_no: u32,
        end_dpid: u64,
        end_port_no: u32,
    },
    LinkRecovery {
        start_dpid: u64,
        start_port_no: u32,
        end_dpid: u64,
        end_port_no: u32,
    },
    ControllerFailure { cid: String },
    ControllerRecovery { cid: String },
    HostMigration {
        old_ingress_dpid: u64,
        old_ingress_port_no: u32,
        new_ingress_dpid: u64,
        new_ingress_port_no: u32,
    },
    PolicyChange { request_type: String },
    TrafficInjection,
    DataplaneDrop,
    ControlChannelBlock { dpid: u64, cid: String },
    ControlChannelUnblock { dpid: u64, cid: String },
}

impl InputKind {
    /// The serialized `class` name, also used as the event-class key in
    /// `RuntimeStats`/`EventSchedulerStats` counters and in the optimized
    /// filtering order (spec §4.7).
    pub fn class_name(&self) -> &'static str {
        match self {
            InputKind::SwitchFailure { .. } => "SwitchFailure",
            InputKind::SwitchRecovery { .. } => "SwitchRecovery",
            InputKind::LinkFailure { .. } => "LinkFailure",
            InputKind::LinkRecovery { .. } => "LinkRecovery",
            InputKind::ControllerFailure { .. } => "ControllerFailure",
            InputKind::ControllerRecovery { .. } => "ControllerRecovery",
            InputKind::HostMigration { .. } => "HostMigration",
            InputKind::PolicyChange { .. } => "PolicyChange",
            InputKind::TrafficInjection => "TrafficInjection",
            InputKind::DataplaneDrop => "DataplaneDrop",
            InputKind::ControlChannelBlock { .. } => "ControlChannelBlock",
            InputKind::ControlChannelUnblock { .. } => "ControlChannelUnblock",
        }
    }

    /// Identity used by `EventDag::atomic_input_events` to match a
    /// `*Failure` to its `*Recovery` (spec §3, "atomicity is determined by
    /// matching on entity identity"). `None` for event classes that never
    /// pair up (`PolicyChange`, `TrafficInjection`, ...).
    fn atom_identity(&self) -> Option<(&'static str, u64, u64)> {
        match self {
            InputKind::SwitchFailure { dpid } | InputKind::SwitchRecovery { dpid } => {
                Some(("switch", *dpid, 0))
            }
            InputKind::LinkFailure {
                start_dpid,
                start_port_no,
                ..
            }
            | InputKind::LinkRecovery {
                start_dpid,
                start_port_no,
                ..
            } => Some(("link", *start_dpid, *start_port_no as u64)),
            InputKind::ControllerFailure { cid } | InputKind::ControllerRecovery { cid } => {
                Some(("controller", hash_label(cid), 0))
            }
            _ => None,
        }
    }

    fn is_recovery(&self) -> bool {
        matches!(
            self,
            InputKind::SwitchRecovery { .. }
                | InputKind::LinkRecovery { .. }
                | InputKind::ControllerRecovery { .. }
        )
    }
}

fn hash_label(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub label: Label,
    pub recorded_time: Timestamp,
    pub round: i64,
    /// Labels of internal events this input caused in the original run.
    pub dependent_labels: Vec<Label>,
    pub kind: InputKind,
}

impl InputEvent {
    /// Performs the injection against the collaborator's narrow contract.
    /// Returns true if injection succeeded (spec §3).
    pub fn proceed(&self, simulation: &mut dyn Simulation) -> bool {
        simulation.inject(&self.kind)
    }

    pub fn atom_key(&self) -> Option<(&'static str, u64, u64)> {
        self.kind.atom_identity()
    }

    pub fn is_recovery(&self) -> bool {
        self.kind.is_recovery()
    }
}

/// Identity of the observable an `InternalEvent` waits for: either a
/// buffered gate message, or a controller state-change tuple (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    PendingMessage {
        dpid: u64,
        cid: String,
        message_fingerprint: String,
    },
    ControllerStateChange {
        cid: String,
        state: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalEvent {
    pub label: Label,
    pub recorded_time: Timestamp,
    pub round: i64,
    pub fingerprint: Fingerprint,
    pub class_name: String,
    /// If true the scheduler must wait indefinitely rather than time out
    /// (spec §3, §4.3).
    pub timeout_disallowed: bool,
}

impl InternalEvent {
    /// True iff the expected observation has now been made against the live
    /// simulation; if so, releases the matched pending item (spec §4.2).
    pub fn proceed(&self, simulation: &mut dyn Simulation) -> bool {
        simulation.gate().try_match_and_release(&self.fingerprint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Input(InputEvent),
    Internal(InternalEvent),
}

impl Event {
    pub fn label(&self) -> &str {
        match self {
            Event::Input(e) => &e.label,
            Event::Internal(e) => &e.label,
        }
    }

    pub fn recorded_time(&self) -> Timestamp {
        match self {
            Event::Input(e) => e.recorded_time,
            Event::Internal(e) => e.recorded_time,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Event::Input(e) => e.kind.class_name(),
            Event::Internal(e) => &e.class_name,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Event::Input(_))
    }

    pub fn as_input(&self) -> Option<&InputEvent> {
        match self {
            Event::Input(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_internal(&self) -> Option<&InternalEvent> {
        match self {
            Event::Internal(e) => Some(e),
            _ => None,
        }
    }

    pub fn timeout_disallowed(&self) -> bool {
        match self {
            Event::Input(_) => false,
            Event::Internal(e) => e.timeout_disallowed,
        }
    }

    /// Dispatches to [`InputEvent::proceed`] or [`InternalEvent::proceed`].
    pub fn proceed(&self, simulation: &mut dyn Simulation) -> bool {
        match self {
            Event::Input(e) => e.proceed(simulation),
            Event::Internal(e) => e.proceed(simulation),
        }
    }
}

/// Event classes tried, in order, by optimized filtering (spec §4.7).
pub const OPTIMIZED_FILTER_ORDER: &[&str] = &[
    "TrafficInjection",
    "DataplaneDrop",
    "SwitchFailure",
    "SwitchRecovery",
    "LinkFailure",
    "LinkRecovery",
    "HostMigration",
    "ControllerFailure",
    "ControllerRecovery",
    "PolicyChange",
    "ControlChannelBlock",
    "ControlChannelUnblock",
];
