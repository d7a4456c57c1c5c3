//! `PrecomputeCache`, spec §4.6.

use std::collections::HashSet;

use crate::event::Label;

/// A canonicalized input sequence: the tuple of event labels in order.
pub type Canonical = Vec<Label>;

/// Pure in-memory set of input sequences already replayed, to short-circuit
/// redundant subsets during ddmin.
#[derive(Debug, Default)]
pub struct PrecomputeCache {
    done: HashSet<Canonical>,
}

impl PrecomputeCache {
    pub fn new() -> PrecomputeCache {
        PrecomputeCache::default()
    }

    pub fn already_done(&self, seq: &[Label]) -> bool {
        self.done.contains(seq)
    }

    pub fn update(&mut self, seq: &[Label]) {
        self.done.insert(seq.to_vec());
    }
}

/// Power-set variant: when a sequence is known violating, every superset is
/// implicitly done (no point re-testing, the smaller cause already
/// explains it); when known non-violating, every subset is. Obvious
/// antichain maintenance, spec §4.6.
#[derive(Debug, Default)]
pub struct PrecomputePowerSetCache {
    violating: Vec<HashSet<Label>>,
    non_violating: Vec<HashSet<Label>>,
}

impl PrecomputePowerSetCache {
    pub fn new() -> PrecomputePowerSetCache {
        PrecomputePowerSetCache::default()
    }

    pub fn already_done(&self, seq: &[Label]) -> bool {
        let set: HashSet<Label> = seq.iter().cloned().collect();
        self.violating.iter().any(|v| v.is_subset(&set))
            || self.non_violating.iter().any(|nv| nv.is_superset(&set))
    }

    pub fn mark_violating(&mut self, seq: &[Label]) {
        let set: HashSet<Label> = seq.iter().cloned().collect();
        self.violating.retain(|v| !v.is_superset(&set));
        self.violating.push(set);
    }

    pub fn mark_non_violating(&mut self, seq: &[Label]) {
        let set: HashSet<Label> = seq.iter().cloned().collect();
        self.non_violating.retain(|nv| !set.is_superset(nv));
        self.non_violating.push(set);
    }

    pub fn update(&mut self, seq: &[Label], violating: bool) {
        if violating {
            self.mark_violating(seq);
        } else {
            self.mark_non_violating(seq);
        }
    }
}
