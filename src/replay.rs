//! `Replayer`, spec §4.5 — a collaborator contract wrapper: orchestrates one
//! end-to-end replay of a dag against a simulation and collects the records
//! `MCSFinder` needs.

use std::{collections::HashSet, path::Path};

use log::{debug, warn};

use crate::{
    dag::EventDag,
    error::{EngineError, Result},
    event::{Event, Fingerprint, Label},
    io::IoMultiplexer,
    scheduler::{EventSchedulerStats, SchedulerConfig, EventScheduler},
    sim::Simulation,
    time::as_duration,
    trace,
};

#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// Internal events observed new compared to the logged dag: pending
    /// gate items left over at the end of the replay that no internal
    /// event in `dag` ever claimed.
    pub new_internal_events: Vec<String>,
    /// Internal events that fired earlier than their logged position: their
    /// causing inputs had not all been injected yet when they matched.
    pub early_internal_events: Vec<Label>,
    pub scheduler_stats: EventSchedulerStats,
}

pub struct Replayer {
    config: SchedulerConfig,
    /// `(dpid, cid, message_fingerprint)` of internal events still buffered,
    /// unreleased, at the end of the original run (the `.unacked` sibling
    /// file, spec §6). Subtracted from every replay's pending-receipt
    /// accounting so they aren't overcounted as "new" on every run.
    unacked_baseline: Vec<(u64, String, String)>,
}

impl Replayer {
    pub fn new(config: SchedulerConfig) -> Replayer {
        Replayer {
            config,
            unacked_baseline: Vec::new(),
        }
    }

    /// Loads `<superlog_path>.unacked`, matching `_track_new_internal_events`'s
    /// own lookup. A missing file is not an error: it warns and leaves the
    /// baseline empty, same as the original's `log.warn` + early return.
    pub fn with_unacked_baseline(mut self, superlog_path: &Path) -> Result<Replayer> {
        match trace::read_unacked(superlog_path)? {
            Some(events) => {
                self.unacked_baseline = events
                    .iter()
                    .filter_map(|e| match e {
                        Event::Internal(ie) => match &ie.fingerprint {
                            Fingerprint::PendingMessage {
                                dpid,
                                cid,
                                message_fingerprint,
                            } => Some((*dpid, cid.clone(), message_fingerprint.clone())),
                            Fingerprint::ControllerStateChange { .. } => None,
                        },
                        Event::Input(_) => None,
                    })
                    .collect();
            }
            None => warn!("unacked internal events file from original run does not exist"),
        }
        Ok(self)
    }

    /// Runs `dag` forward against `simulation`, waits `end_wait_seconds` in
    /// case the violation takes a moment to surface, then cleans up (spec
    /// §4.5/§5: "After each run the simulation is cleanUped").
    pub fn replay(&self, dag: &EventDag, simulation: &mut dyn Simulation) -> Result<ReplayOutcome> {
        let mut io = IoMultiplexer::new().map_err(|e| EngineError::Resource(e.to_string()))?;
        let mut scheduler = EventScheduler::new(self.config.clone());
        let mut injected: HashSet<Label> = HashSet::new();
        let mut early = Vec::new();

        for event in dag.events() {
            let matched = scheduler.schedule(event, &mut io, simulation)?;
            match event {
                Event::Input(e) => {
                    if matched {
                        injected.insert(e.label.clone());
                    }
                }
                Event::Internal(e) => {
                    if matched {
                        let causes = dag.causes_of(&e.label);
                        if !causes.iter().all(|c| injected.contains(c)) {
                            debug!("internal event {} fired before its causes were all injected", e.label);
                            early.push(e.label.clone());
                        }
                    }
                }
            }
        }

        debug!("sleeping {:.0}s after run", self.config.end_wait_seconds);
        io.sleep(as_duration(self.config.end_wait_seconds))
            .map_err(|e| EngineError::Resource(e.to_string()))?;

        let mut unacked = self.unacked_baseline.clone();
        let gate = simulation.gate();
        let new_internal_events: Vec<String> = gate
            .pending_receives()
            .filter(|p| {
                if let Some(pos) = unacked
                    .iter()
                    .position(|(dpid, cid, fp)| *dpid == p.dpid && *cid == p.cid && *fp == p.message_fingerprint)
                {
                    unacked.remove(pos);
                    false
                } else {
                    true
                }
            })
            .map(|p| format!("receipt {}/{}: {}", p.dpid, p.cid, p.message_fingerprint))
            .chain(
                gate.pending_sends()
                    .map(|p| format!("send {}/{}: {}", p.dpid, p.cid, p.message_fingerprint)),
            )
            .collect();

        io.close_all();
        simulation.clean_up();

        Ok(ReplayOutcome {
            new_internal_events,
            early_internal_events: early,
            scheduler_stats: scheduler.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{Fingerprint, InputEvent, InputKind, InternalEvent},
        sim::MockSimulation,
        time::Timestamp,
    };

    fn input(label: &str, dependents: &[&str], kind: InputKind) -> Event {
        Event::Input(InputEvent {
            label: label.to_string(),
            recorded_time: Timestamp::ZERO,
            round: 0,
            dependent_labels: dependents.iter().map(|s| s.to_string()).collect(),
            kind,
        })
    }

    fn internal(label: &str, fingerprint: Fingerprint) -> Event {
        Event::Internal(InternalEvent {
            label: label.to_string(),
            recorded_time: Timestamp::ZERO,
            round: 0,
            fingerprint,
            class_name: "MastershipChange".into(),
            timeout_disallowed: false,
        })
    }

    #[test]
    fn replay_matches_all_events_and_cleans_up() {
        let dag = EventDag::new(vec![
            input("e1", &["i1"], InputKind::SwitchFailure { dpid: 1 }),
            internal(
                "i1",
                Fingerprint::ControllerStateChange {
                    cid: "c1".into(),
                    state: "ok".into(),
                },
            ),
        ]);
        let mut sim = MockSimulation::new();
        // Seed the matching state change so i1's proceed() succeeds.
        sim.gate().observe_state_change("c1".into(), "ok".into());

        let cfg = SchedulerConfig {
            initial_wait: 0.0,
            epsilon_seconds: 0.2,
            sleep_interval_seconds: 0.02,
            end_wait_seconds: 0.0,
            ..SchedulerConfig::default()
        };
        let replayer = Replayer::new(cfg);
        let outcome = replayer.replay(&dag, &mut sim).unwrap();

        assert_eq!(outcome.scheduler_stats.total_matched(), 2);
        assert!(outcome.early_internal_events.is_empty());
        assert!(sim.cleaned_up);
    }

    #[test]
    fn leftover_pending_gate_items_are_new_internal_events() {
        let dag = EventDag::new(vec![input("e1", &[], InputKind::SwitchFailure { dpid: 1 })]);
        let mut sim = MockSimulation::new();
        sim.gate().insert_pending_receipt(1, "c1".into(), "unexpected".into());

        let cfg = SchedulerConfig {
            initial_wait: 0.0,
            end_wait_seconds: 0.0,
            ..SchedulerConfig::default()
        };
        let replayer = Replayer::new(cfg);
        let outcome = replayer.replay(&dag, &mut sim).unwrap();
        assert_eq!(outcome.new_internal_events.len(), 1);
    }

    #[test]
    fn unacked_baseline_is_subtracted_from_leftover_receipts() {
        let dag = EventDag::new(vec![input("e1", &[], InputKind::SwitchFailure { dpid: 1 })]);
        let mut sim = MockSimulation::new();
        sim.gate().insert_pending_receipt(1, "c1".into(), "already-buffered".into());
        sim.gate().insert_pending_receipt(1, "c1".into(), "genuinely-new".into());

        let path = std::env::temp_dir().join(format!("sts-replay-unacked-test-{}.jsonl", std::process::id()));
        crate::trace::write_superlog(
            &path,
            &[internal(
                "i0",
                Fingerprint::PendingMessage {
                    dpid: 1,
                    cid: "c1".into(),
                    message_fingerprint: "already-buffered".into(),
                },
            )],
        )
        .unwrap();
        std::fs::rename(&path, path.with_extension("jsonl.unacked")).unwrap();
        let unacked_path = path.with_extension("jsonl.unacked");

        let cfg = SchedulerConfig {
            initial_wait: 0.0,
            end_wait_seconds: 0.0,
            ..SchedulerConfig::default()
        };
        let replayer = Replayer::new(cfg).with_unacked_baseline(&path).unwrap();
        let outcome = replayer.replay(&dag, &mut sim).unwrap();

        assert_eq!(outcome.new_internal_events, vec!["receipt 1/c1: genuinely-new".to_string()]);
        std::fs::remove_file(&unacked_path).ok();
    }
}
