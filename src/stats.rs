//! `RuntimeStats`, spec §4.7/§6: the run-wide bookkeeping `MCSFinder` builds
//! up across every replay and dumps to `runtime_stats.json`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{config::Config, replay::ReplayOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub total_replays: u32,
    pub total_inputs_replayed: u64,
    /// Size of the current candidate subset at each ddmin iteration, in the
    /// order runs were attempted.
    pub iteration_size: Vec<usize>,
    pub violation_found_in_run: Vec<bool>,
    pub new_internal_events: Vec<Vec<String>>,
    pub early_internal_events: Vec<Vec<String>>,
    pub matched_events: HashMap<String, u64>,
    pub timed_out_events: HashMap<String, u64>,
    pub initial_verification_runs_needed: u32,
    pub replay_duration_seconds: f64,
    pub prune_duration_seconds: f64,
    pub original_duration_seconds: f64,
    pub total_events: usize,
    pub total_inputs: usize,
    /// Count of subsets whose violation outcome flipped between repeated
    /// replays under the same inputs (spec §4.9 "ambiguous" bookkeeping).
    pub ambiguous_counts: u32,
    pub ambiguous_events: Vec<Vec<String>>,
    pub config: Config,
}

impl RuntimeStats {
    pub fn new(config: Config, total_events: usize, total_inputs: usize) -> RuntimeStats {
        RuntimeStats {
            total_events,
            total_inputs,
            config,
            ..Default::default()
        }
    }

    /// Folds in the outcome of one replay attempted over `subset_size`
    /// inputs, whether or not it reproduced the violation. `iteration_size`
    /// is tracked separately, once per ddmin candidate, not once per replay
    /// attempt here.
    pub fn record_replay(&mut self, subset_size: usize, violation_found: bool, outcome: &ReplayOutcome) {
        self.total_replays += 1;
        self.total_inputs_replayed += subset_size as u64;
        self.violation_found_in_run.push(violation_found);
        self.new_internal_events.push(outcome.new_internal_events.clone());
        self.early_internal_events.push(outcome.early_internal_events.clone());
        for (class, n) in outcome.scheduler_stats.matched_counts() {
            *self.matched_events.entry(class.clone()).or_insert(0) += n;
        }
        for (class, n) in outcome.scheduler_stats.timeout_counts() {
            *self.timed_out_events.entry(class.clone()).or_insert(0) += n;
        }
        if !outcome.new_internal_events.is_empty() || !outcome.early_internal_events.is_empty() {
            self.ambiguous_counts += 1;
            let mut merged = outcome.new_internal_events.clone();
            merged.extend(outcome.early_internal_events.clone());
            self.ambiguous_events.push(merged);
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::EventSchedulerStats;

    fn empty_outcome() -> ReplayOutcome {
        ReplayOutcome {
            new_internal_events: vec![],
            early_internal_events: vec![],
            scheduler_stats: EventSchedulerStats::new(),
        }
    }

    #[test]
    fn record_replay_accumulates_totals() {
        let mut stats = RuntimeStats::new(Config::default(), 10, 6);
        stats.record_replay(6, true, &empty_outcome());
        stats.record_replay(3, false, &empty_outcome());
        assert_eq!(stats.total_replays, 2);
        assert_eq!(stats.total_inputs_replayed, 9);
        assert_eq!(stats.violation_found_in_run, vec![true, false]);
    }

    #[test]
    fn new_internal_events_mark_ambiguous() {
        let mut stats = RuntimeStats::new(Config::default(), 1, 1);
        let mut outcome = empty_outcome();
        outcome.new_internal_events.push("receipt 1/c1: fp".into());
        stats.record_replay(1, false, &outcome);
        assert_eq!(stats.ambiguous_counts, 1);
    }

    #[test]
    fn serializes_to_json() {
        let stats = RuntimeStats::new(Config::default(), 0, 0);
        let json = stats.to_json().unwrap();
        assert!(json.contains("total_replays"));
    }
}
