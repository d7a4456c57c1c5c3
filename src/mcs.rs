//! `MCSFinder`, spec §4.7 (classical ddmin) and §4.8 (efficient/atom-aware
//! variant), plus §4.9's reproducibility gate and §4.10's intermediate dumps.

use std::path::PathBuf;

use log::info;

use crate::{
    dag::{split_list, Atom, EventDag},
    error::{EngineError, Result},
    event::Label,
    precompute::{PrecomputeCache, PrecomputePowerSetCache},
    replay::Replayer,
    sim::{InvariantCheck, Simulation},
    stats::RuntimeStats,
    trace,
};

fn label_sequence(dag: &EventDag) -> Vec<Label> {
    dag.input_events().iter().map(|e| e.label.clone()).collect()
}

/// Scalar knobs for [`MCSFinder::new`], grouped to keep the constructor from
/// sprawling across every ddmin/reproducibility setting individually.
pub struct MCSFinderOptions {
    pub verify_replays: u32,
    pub max_iterations: u32,
    pub use_efficient: bool,
    /// Where intermediate MCS dumps are written (spec §4.10); `None`
    /// disables dumping.
    pub dump_dir: Option<PathBuf>,
    /// Prune whole event classes at a time before ddmin proper (spec §4.7
    /// "optimized filtering").
    pub optimized_filtering: bool,
}

pub struct MCSFinder<F> {
    invariant_check: InvariantCheck,
    replayer: Replayer,
    verify_replays: u32,
    max_iterations: u32,
    use_efficient: bool,
    optimized_filtering: bool,
    simulation_factory: F,
    pub stats: RuntimeStats,
    dump_dir: Option<PathBuf>,
    intermediate_count: u32,
    smallest_dump_size: usize,
}

impl<F> MCSFinder<F>
where
    F: FnMut() -> Box<dyn Simulation>,
{
    pub fn new(
        invariant_check: InvariantCheck,
        replayer: Replayer,
        options: MCSFinderOptions,
        stats: RuntimeStats,
        simulation_factory: F,
    ) -> MCSFinder<F> {
        MCSFinder {
            invariant_check,
            replayer,
            verify_replays: options.verify_replays.max(1),
            max_iterations: options.max_iterations,
            use_efficient: options.use_efficient,
            optimized_filtering: options.optimized_filtering,
            simulation_factory,
            stats,
            dump_dir: options.dump_dir,
            intermediate_count: 0,
            smallest_dump_size: usize::MAX,
        }
    }

    /// Runs one replay of `dag` and checks the invariant, recording stats.
    fn single_replay(&mut self, dag: &EventDag) -> Result<bool> {
        let mut simulation = (self.simulation_factory)();
        let outcome = self.replayer.replay(dag, simulation.as_mut())?;
        let violations = (self.invariant_check)(simulation.as_ref());
        let found = !violations.is_empty();
        self.stats.record_replay(dag.input_events().len(), found, &outcome);
        if found {
            info!("violation reproduced: {violations:?}");
        }
        Ok(found)
    }

    /// Replays `dag` up to `verify_replays` times, returning whether the
    /// invariant was violated on any attempt (spec §4.7 "_check_violation").
    fn check_violation(&mut self, dag: &EventDag) -> Result<bool> {
        for _ in 0..self.verify_replays {
            if self.single_replay(dag)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Runs the reproducibility gate (spec §4.9): the un-pruned trace must
    /// reproduce the violation within `verify_replays` attempts, else the
    /// run is not reproducible and the caller should exit with code 5.
    fn verify_reproducible(&mut self, dag: &EventDag) -> Result<()> {
        for attempt in 0..self.verify_replays {
            if self.single_replay(dag)? {
                self.stats.initial_verification_runs_needed = attempt + 1;
                return Ok(());
            }
        }
        Err(EngineError::NotReproducible {
            runs: self.verify_replays,
        })
    }

    /// Employs domain knowledge of event classes to shrink the dag before
    /// ddmin proper: for each class in `OPTIMIZED_FILTER_ORDER`, tests the
    /// dag with every event of that class removed, and keeps the reduction
    /// if the violation still reproduces (spec §4.7 "optimized filtering",
    /// `_optimize_event_dag`).
    fn optimize_event_dag(&mut self, mut dag: EventDag) -> Result<EventDag> {
        for class in crate::event::OPTIMIZED_FILTER_ORDER {
            let class_labels: std::collections::HashSet<Label> = dag
                .input_events()
                .iter()
                .filter(|e| e.kind.class_name() == *class)
                .map(|e| e.label.clone())
                .collect();
            if class_labels.is_empty() {
                info!("no events pruned for event type {class}. Next!");
                continue;
            }
            let pruned_dag = dag.input_complement(&class_labels);
            if self.single_replay(&pruned_dag)? {
                info!("violation for pruning event type {class}! resizing original dag");
                dag = pruned_dag;
            }
        }
        Ok(dag)
    }

    fn maybe_dump_intermediate(&mut self, dag: &EventDag, label: &str) {
        let Some(dir) = self.dump_dir.clone() else { return };
        if dag.len() >= self.smallest_dump_size {
            return;
        }
        self.smallest_dump_size = dag.len();
        self.intermediate_count += 1;
        let dst = dir.join(format!("intermcs_{}_{}", self.intermediate_count, label.replace('/', ".")));
        if std::fs::create_dir_all(&dst).is_ok() {
            let path = dst.join("mcs.trace");
            if let Err(e) = trace::write_superlog(&path, dag.events()) {
                info!("failed to dump intermediate MCS to {}: {e}", path.display());
            }
        }
    }

    /// Prepares `dag` (spec §3: drop recoveries without a matching prior
    /// failure, then drop event classes the scheduler cannot interpret),
    /// verifies reproducibility, then minimizes via the configured ddmin
    /// variant.
    pub fn run(&mut self, dag: EventDag) -> Result<EventDag> {
        let dag = dag.mark_invalid_input_sequences();
        let supported: std::collections::HashSet<&str> = crate::event::OPTIMIZED_FILTER_ORDER.iter().copied().collect();
        let dag = dag.filter_unsupported_input_types(&supported);
        if dag.is_empty() {
            return Err(EngineError::TraceCorrupt("no supported input types in trace".to_string()));
        }
        self.stats.total_inputs = dag.input_events().len();

        self.verify_reproducible(&dag)?;
        info!("violation reproduced successfully, proceeding with pruning");

        let dag = if self.optimized_filtering {
            self.optimize_event_dag(dag)?
        } else {
            dag
        };

        if self.use_efficient {
            let mut cache = PrecomputePowerSetCache::new();
            let atoms = dag.atomic_input_events();
            let relevant = self.efficient_ddmin(&dag, atoms, &mut cache)?;
            Ok(dag.atomic_input_subset(&relevant))
        } else {
            let mut cache = PrecomputeCache::new();
            let (mcs, _pruned) = self.classical_ddmin(dag, 2, &mut cache, 0, String::new())?;
            Ok(mcs)
        }
    }

    /// The delta-debugging algorithm from Zeller & Hildebrandt, section 3.2:
    /// split into `split_ways` subsets, test each subset and then each
    /// complement for the violation, recursing on the first hit and
    /// doubling granularity when nothing reduces (spec §4.7).
    fn classical_ddmin(
        &mut self,
        dag: EventDag,
        split_ways: usize,
        cache: &mut PrecomputeCache,
        total_pruned: usize,
        label_prefix: String,
    ) -> Result<(EventDag, usize)> {
        if self.stats.total_replays > self.max_iterations {
            return Ok((dag, total_pruned));
        }
        let atoms = dag.atomic_input_events();
        if split_ways > atoms.len() {
            return Ok((dag, total_pruned));
        }

        let subsets = split_list(&atoms, split_ways);

        for (i, subset) in subsets.iter().enumerate() {
            let label = format!("{label_prefix}{i}/{split_ways}");
            let candidate = dag.atomic_input_subset(subset);
            let seq = label_sequence(&candidate);
            if cache.already_done(&seq) || seq.is_empty() {
                continue;
            }
            cache.update(&seq);
            self.stats.iteration_size.push(self.stats.total_inputs - total_pruned);
            if self.check_violation(&candidate)? {
                self.maybe_dump_intermediate(&candidate, &label);
                let pruned = total_pruned + (dag.input_events().len() - candidate.input_events().len());
                return self.classical_ddmin(candidate, 2, cache, pruned, format!("{label}."));
            }
        }

        for (i, subset) in subsets.iter().enumerate() {
            let label = format!("~{label_prefix}{i}/{split_ways}");
            let complement_atoms: Vec<Atom> = atoms
                .iter()
                .filter(|a| !subset.contains(a))
                .cloned()
                .collect();
            let candidate = dag.atomic_input_subset(&complement_atoms);
            let seq = label_sequence(&candidate);
            if cache.already_done(&seq) || seq.is_empty() {
                continue;
            }
            cache.update(&seq);
            self.stats.iteration_size.push(self.stats.total_inputs - total_pruned);
            if self.check_violation(&candidate)? {
                self.maybe_dump_intermediate(&candidate, &label);
                let pruned = total_pruned + (dag.input_events().len() - candidate.input_events().len());
                return self.classical_ddmin(candidate, (split_ways - 1).max(2), cache, pruned, format!("{label}."));
            }
        }

        if split_ways < atoms.len() {
            return self.classical_ddmin(dag, (split_ways * 2).min(atoms.len()), cache, total_pruned, label_prefix);
        }
        Ok((dag, total_pruned))
    }

    /// Zeller 1999's linear-pass variant: atoms confirmed irrelevant are
    /// dropped via the complement test, atoms confirmed relevant move into
    /// `relevant` and are always carried over (spec §4.8, "atom integrity").
    fn efficient_ddmin(
        &mut self,
        dag: &EventDag,
        mut candidates: Vec<Atom>,
        cache: &mut PrecomputePowerSetCache,
    ) -> Result<Vec<Atom>> {
        let mut relevant: Vec<Atom> = Vec::new();
        let mut granularity = 2usize;

        while !candidates.is_empty() {
            if self.stats.total_replays > self.max_iterations {
                break;
            }
            if granularity > candidates.len() {
                relevant.extend(candidates);
                break;
            }
            let subsets = split_list(&candidates, granularity);
            let mut reduced = false;

            for subset in &subsets {
                let complement: Vec<Atom> = candidates
                    .iter()
                    .filter(|a| !subset.contains(a))
                    .cloned()
                    .collect();
                let test_dag = dag.atomic_input_subset_with_carryover(&complement, &relevant);
                let seq = label_sequence(&test_dag);
                if cache.already_done(&seq) || seq.is_empty() {
                    continue;
                }
                let violation = self.check_violation(&test_dag)?;
                cache.update(&seq, violation);
                if violation {
                    candidates = complement;
                    granularity = (granularity.saturating_sub(1)).max(2);
                    reduced = true;
                    break;
                }
            }

            if !reduced {
                if granularity >= candidates.len() {
                    relevant.extend(candidates);
                    break;
                }
                granularity = (granularity * 2).min(candidates.len());
            }
        }
        Ok(relevant)
    }
}
