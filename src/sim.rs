//! Collaborator interfaces consumed by the core (spec §1, §6), plus the one
//! concrete backend this crate ships: an in-memory mock network used by the
//! CLI and the test suite. A real backend (actual switches, an openflow wire
//! layer, real controller processes) is a separate, substitutable crate;
//! this module only defines and minimally implements the narrow contract.

use std::{
    any::Any,
    collections::HashSet,
    sync::Arc,
};

use crate::{event::InputKind, gate::DeferredConnectionGate};

/// Narrow contract a replay drives against (spec §6): the gate for matching
/// internal events, an injection hook for input events, and cleanup.
pub trait Simulation: Any {
    fn gate(&mut self) -> &mut DeferredConnectionGate;

    /// Perform the external injection named by `kind`. Returns whether
    /// injection succeeded.
    fn inject(&mut self, kind: &InputKind) -> bool;

    /// Releases sockets, kills controller processes (spec §4.5).
    fn clean_up(&mut self);

    fn as_any(&self) -> &dyn Any;
}

/// Narrow `Controller` contract (spec §6).
pub trait Controller {
    fn cid(&self) -> &str;
    fn label(&self) -> &str;
    fn start(&mut self);
    fn kill(&mut self);
    fn check_process_status(&mut self) -> bool;
    fn alive(&self) -> bool;
}

/// `InvariantCheck(simulation) -> list of violation descriptors` (spec §6);
/// empty list means no violation.
pub type InvariantCheck = Arc<dyn Fn(&dyn Simulation) -> Vec<String> + Send + Sync>;

/// In-memory mock network: tracks the subset of state needed to replay a
/// trace and evaluate the handful of invariants this crate ships, without
/// any real sockets, processes, or wire protocol. Real backends substitute
/// their own `Simulation` impl entirely; this one exists so the engine is
/// runnable and testable on its own.
#[derive(Debug, Default)]
pub struct MockSimulation {
    gate: DeferredConnectionGate,
    pub down_switches: HashSet<u64>,
    pub down_links: HashSet<(u64, u32, u64, u32)>,
    pub down_controllers: HashSet<String>,
    pub blocked_channels: HashSet<(u64, String)>,
    /// Every input event's class name that was successfully injected, keyed
    /// by label, so scenario tests can phrase invariants as "is label X
    /// present" (spec §8 scenarios S1–S3).
    pub injected_labels: HashSet<String>,
    pub cleaned_up: bool,
}

impl MockSimulation {
    pub fn new() -> MockSimulation {
        MockSimulation::default()
    }

    /// Tests label injections through this hook instead of `proceed`, so a
    /// scenario can seed `injected_labels` directly without going through
    /// the scheduler — used to express "label-present" invariants.
    pub fn mark_injected(&mut self, label: &str) {
        self.injected_labels.insert(label.to_string());
    }
}

impl Simulation for MockSimulation {
    fn gate(&mut self) -> &mut DeferredConnectionGate {
        &mut self.gate
    }

    fn inject(&mut self, kind: &InputKind) -> bool {
        match kind {
            InputKind::SwitchFailure { dpid } => {
                self.down_switches.insert(*dpid);
            }
            InputKind::SwitchRecovery { dpid } => {
                self.down_switches.remove(dpid);
            }
            InputKind::LinkFailure {
                start_dpid,
                start_port_no,
                end_dpid,
                end_port_no,
            } => {
                self.down_links
                    .insert((*start_dpid, *start_port_no, *end_dpid, *end_port_no));
            }
            InputKind::LinkRecovery {
                start_dpid,
                start_port_no,
                end_dpid,
                end_port_no,
            } => {
                self.down_links
                    .remove(&(*start_dpid, *start_port_no, *end_dpid, *end_port_no));
            }
            InputKind::ControllerFailure { cid } => {
                self.down_controllers.insert(cid.clone());
            }
            InputKind::ControllerRecovery { cid } => {
                self.down_controllers.remove(cid);
            }
            InputKind::ControlChannelBlock { dpid, cid } => {
                self.blocked_channels.insert((*dpid, cid.clone()));
            }
            InputKind::ControlChannelUnblock { dpid, cid } => {
                self.blocked_channels.remove(&(*dpid, cid.clone()));
            }
            InputKind::HostMigration { .. }
            | InputKind::PolicyChange { .. }
            | InputKind::TrafficInjection
            | InputKind::DataplaneDrop => {
                // No network-state side effect to track for these classes;
                // injection itself always succeeds.
            }
        }
        true
    }

    fn clean_up(&mut self) {
        self.gate.clear();
        self.cleaned_up = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn mock(simulation: &dyn Simulation) -> Option<&MockSimulation> {
    simulation.as_any().downcast_ref::<MockSimulation>()
}

/// Built-in invariants over [`MockSimulation`] state, registered by name for
/// the CLI config path (spec §7 `ConfigError` on unknown name).
pub fn name_to_invariant_check(name: &str) -> Option<InvariantCheck> {
    let f: InvariantCheck = match name {
        "no_switches_down" => Arc::new(|sim| match mock(sim) {
            Some(m) => m
                .down_switches
                .iter()
                .map(|dpid| format!("switch {dpid} is down"))
                .collect(),
            None => Vec::new(),
        }),
        "no_links_down" => Arc::new(|sim| match mock(sim) {
            Some(m) => m
                .down_links
                .iter()
                .map(|(sd, sp, ed, ep)| format!("link {sd}:{sp} -> {ed}:{ep} is down"))
                .collect(),
            None => Vec::new(),
        }),
        "no_controllers_down" => Arc::new(|sim| match mock(sim) {
            Some(m) => m
                .down_controllers
                .iter()
                .map(|cid| format!("controller {cid} is down"))
                .collect(),
            None => Vec::new(),
        }),
        _ => return None,
    };
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_invariant_name_is_none() {
        assert!(name_to_invariant_check("no_such_check").is_none());
    }

    #[test]
    fn switch_failure_injection_trips_no_switches_down() {
        let mut sim = MockSimulation::new();
        sim.inject(&InputKind::SwitchFailure { dpid: 8 });
        let check = name_to_invariant_check("no_switches_down").unwrap();
        assert_eq!(check(&sim), vec!["switch 8 is down".to_string()]);
    }

    #[test]
    fn switch_recovery_clears_the_violation() {
        let mut sim = MockSimulation::new();
        sim.inject(&InputKind::SwitchFailure { dpid: 8 });
        sim.inject(&InputKind::SwitchRecovery { dpid: 8 });
        let check = name_to_invariant_check("no_switches_down").unwrap();
        assert!(check(&sim).is_empty());
    }
}
