//! Scenarios S1-S6 covering the universal properties over MCS discovery and
//! replay: subset-ness, reproduction, minimality, and the efficient
//! variant's replay-count bound.

use std::sync::Arc;

use test_case::test_case;

use sts_replay::{
    config::Config,
    dag::EventDag,
    error::EngineError,
    event::{Event, InputEvent, InputKind},
    mcs::{MCSFinder, MCSFinderOptions},
    replay::Replayer,
    scheduler::SchedulerConfig,
    sim::{InvariantCheck, MockSimulation, Simulation},
    stats::RuntimeStats,
    time::Timestamp,
};

fn switch_failure(label: &str, dpid: u64) -> Event {
    Event::Input(InputEvent {
        label: label.to_string(),
        recorded_time: Timestamp::ZERO,
        round: 0,
        dependent_labels: vec![],
        kind: InputKind::SwitchFailure { dpid },
    })
}

fn six_inputs() -> Vec<Event> {
    (1..=6).map(|i| switch_failure(&format!("e{i}"), i)).collect()
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        initial_wait: 0.0,
        epsilon_seconds: 0.05,
        sleep_interval_seconds: 0.01,
        end_wait_seconds: 0.0,
        ..SchedulerConfig::default()
    }
}

fn finder(invariant: InvariantCheck, use_efficient: bool) -> MCSFinder<impl FnMut() -> Box<dyn Simulation>> {
    MCSFinder::new(
        invariant,
        Replayer::new(scheduler_config()),
        MCSFinderOptions {
            verify_replays: 1,
            max_iterations: 1000,
            use_efficient,
            dump_dir: None,
            optimized_filtering: false,
        },
        RuntimeStats::new(Config::default(), 0, 0),
        || Box::new(MockSimulation::new()) as Box<dyn Simulation>,
    )
}

fn down(sim: &dyn Simulation) -> std::collections::HashSet<u64> {
    sim.as_any()
        .downcast_ref::<MockSimulation>()
        .map(|m| m.down_switches.clone())
        .unwrap_or_default()
}

// S1-S3: a 6-input trace run through classical ddmin against three
// invariants of increasing cause-set size, each expected to reduce to
// exactly its cause set.
#[test_case(&[1], &["e1"]; "s1 single cause")]
#[test_case(&[1, 6], &["e1", "e6"]; "s2 straddling cause")]
#[test_case(&[1, 2, 3, 4, 5, 6], &["e1", "e2", "e3", "e4", "e5", "e6"]; "s3 every input required")]
fn classical_ddmin_reduces_to_exactly_the_cause_set(required: &'static [u64], expected: &[&str]) {
    let dag = EventDag::new(six_inputs());
    let required_down: InvariantCheck = Arc::new(move |sim| {
        let d = down(sim);
        if required.iter().all(|dpid| d.contains(dpid)) {
            vec!["required switches down".to_string()]
        } else {
            vec![]
        }
    });
    let mut finder = finder(required_down, false);
    let mcs = finder.run(dag).unwrap();
    let mut labels: Vec<&str> = mcs.input_events().iter().map(|e| e.label.as_str()).collect();
    labels.sort();
    assert_eq!(labels, expected);
}

#[test_log::test]
fn s4_link_failure_and_recovery_replay_matches_both_events_and_cleans_up() {
    let dag = EventDag::new(vec![
        Event::Input(InputEvent {
            label: "e1".into(),
            recorded_time: Timestamp::ZERO,
            round: 0,
            dependent_labels: vec![],
            kind: InputKind::LinkFailure {
                start_dpid: 8,
                start_port_no: 3,
                end_dpid: 9,
                end_port_no: 1,
            },
        }),
        Event::Input(InputEvent {
            label: "e2".into(),
            recorded_time: Timestamp::ZERO,
            round: 1,
            dependent_labels: vec![],
            kind: InputKind::LinkRecovery {
                start_dpid: 8,
                start_port_no: 3,
                end_dpid: 9,
                end_port_no: 1,
            },
        }),
    ]);
    let mut sim = MockSimulation::new();
    let replayer = Replayer::new(scheduler_config());
    let outcome = replayer.replay(&dag, &mut sim).unwrap();

    assert_eq!(outcome.scheduler_stats.total_matched(), 2);
    assert_eq!(outcome.scheduler_stats.total_timed_out(), 0);
    assert!(sim.down_links.is_empty());
    assert!(sim.cleaned_up);
}

#[test]
fn s5_unreproducible_violation_exits_with_not_reproducible_and_records_attempts() {
    let dag = EventDag::new(six_inputs());
    let never: InvariantCheck = Arc::new(|_| vec![]);
    let mut finder = MCSFinder::new(
        never,
        Replayer::new(scheduler_config()),
        MCSFinderOptions {
            verify_replays: 3,
            max_iterations: 1000,
            use_efficient: false,
            dump_dir: None,
            optimized_filtering: false,
        },
        RuntimeStats::new(Config::default(), 0, 0),
        || Box::new(MockSimulation::new()) as Box<dyn Simulation>,
    );

    let err = finder.run(dag).unwrap_err();
    assert!(matches!(err, EngineError::NotReproducible { runs: 3 }));
    assert_eq!(err.exit_code(), 5);
    // No minimization attempted: only the verification attempts were replayed.
    assert_eq!(finder.stats.total_replays, 3);
    assert_eq!(finder.stats.initial_verification_runs_needed, 0);
}

#[test]
fn s6_efficient_variant_stays_within_the_o_of_n_replay_bound() {
    let inputs: Vec<Event> = (1..=7).map(|i| switch_failure(&format!("e{i}"), i)).collect();
    let dag = EventDag::new(inputs);
    let n = 7usize;
    let violation_if_e4: InvariantCheck = Arc::new(|sim| {
        if down(sim).contains(&4) {
            vec!["e4 present".to_string()]
        } else {
            vec![]
        }
    });
    let mut finder = finder(violation_if_e4, true);
    let mcs = finder.run(dag).unwrap();
    let labels: Vec<&str> = mcs.input_events().iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["e4"]);

    let bound = 2 * (n as f64).log2().ceil() as u32 + n as u32;
    assert!(
        finder.stats.total_replays <= bound,
        "total_replays {} exceeded bound {}",
        finder.stats.total_replays,
        bound
    );
}

#[test]
fn mcs_is_always_a_subset_of_the_original_trace() -> anyhow::Result<()> {
    let dag = EventDag::new(six_inputs());
    let original_labels: Vec<String> = dag.input_events().iter().map(|e| e.label.clone()).collect();
    let violation_if_e3_and_e5: InvariantCheck = Arc::new(|sim| {
        let d = down(sim);
        if d.contains(&3) && d.contains(&5) {
            vec!["e3 and e5 present".to_string()]
        } else {
            vec![]
        }
    });
    let mut finder = finder(violation_if_e3_and_e5, false);
    let mcs = finder.run(dag)?;
    for e in mcs.input_events() {
        assert!(original_labels.contains(&e.label));
    }
    Ok(())
}
