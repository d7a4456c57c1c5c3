//! `EventDag`, spec §3 and §4.4.
//!
//! Holds the full ordered event sequence plus the derived views the rest of
//! the engine operates on: the input projection, atomic input grouping, and
//! the subset/complement operators used by both ddmin variants.

use std::collections::{HashMap, HashSet};

use crate::event::{Event, InputEvent, Label};

/// An indivisible group of input labels (e.g. a failure/recovery pair).
/// `MCSFinder`'s efficient variant treats these as atomic: present in full
/// or absent, never split (spec §4.4 "Atom integrity").
pub type Atom = Vec<Label>;

#[derive(Debug, Clone, Default)]
pub struct EventDag {
    events: Vec<Event>,
}

impl EventDag {
    pub fn new(events: Vec<Event>) -> EventDag {
        EventDag { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Projection to inputs, order-preserving.
    pub fn input_events(&self) -> Vec<&InputEvent> {
        self.events.iter().filter_map(Event::as_input).collect()
    }

    /// Inputs grouped into atomic pairs. Two inputs belong to the same atom
    /// iff they share an `atom_key` (same entity identity); a failure and
    /// its first following recovery close the atom, everything else is a
    /// singleton atom.
    pub fn atomic_input_events(&self) -> Vec<Atom> {
        let mut atoms: Vec<Atom> = Vec::new();
        let mut open: HashMap<(&'static str, u64, u64), usize> = HashMap::new();
        for input in self.input_events() {
            match input.atom_key() {
                None => atoms.push(vec![input.label.clone()]),
                Some(key) => {
                    if let Some(&idx) = open.get(&key) {
                        atoms[idx].push(input.label.clone());
                        open.remove(&key);
                    } else {
                        let idx = atoms.len();
                        atoms.push(vec![input.label.clone()]);
                        open.insert(key, idx);
                    }
                }
            }
        }
        atoms
    }

    /// Reverse map: internal-event label -> the set of input labels that
    /// caused it, derived from each input's `dependent_labels`. An internal
    /// event belongs to `input_subset(S)` iff this set is a subset of `S`.
    fn causes(&self) -> HashMap<&Label, HashSet<&Label>> {
        let mut causes: HashMap<&Label, HashSet<&Label>> = HashMap::new();
        for input in self.input_events() {
            for dep in &input.dependent_labels {
                causes.entry(dep).or_default().insert(&input.label);
            }
        }
        causes
    }

    /// Public view of the causes map for a single internal-event label,
    /// used by `Replayer` to detect causality violations (spec §4.5).
    pub fn causes_of(&self, label: &Label) -> HashSet<Label> {
        self.causes()
            .get(label)
            .map(|c| c.iter().map(|l| (*l).clone()).collect())
            .unwrap_or_default()
    }

    /// Returns a new dag containing only inputs in `labels` plus all of
    /// their declared internal dependents, in original order (spec §3, §4.4
    /// "Dependency closure under projection").
    pub fn input_subset(&self, labels: &HashSet<Label>) -> EventDag {
        let causes = self.causes();
        let events = self
            .events
            .iter()
            .filter(|event| match event {
                Event::Input(e) => labels.contains(&e.label),
                Event::Internal(e) => causes
                    .get(&e.label)
                    .map(|c| c.iter().all(|l| labels.contains(*l)))
                    .unwrap_or(false),
            })
            .cloned()
            .collect();
        EventDag::new(events)
    }

    pub fn input_complement(&self, labels: &HashSet<Label>) -> EventDag {
        let all: HashSet<Label> = self.input_events().iter().map(|e| e.label.clone()).collect();
        let complement: HashSet<Label> = all.difference(labels).cloned().collect();
        self.input_subset(&complement)
    }

    /// Same as `input_subset`, but over whole atoms: present or absent as a
    /// unit, never split.
    pub fn atomic_input_subset(&self, atoms: &[Atom]) -> EventDag {
        let labels: HashSet<Label> = atoms.iter().flatten().cloned().collect();
        self.input_subset(&labels)
    }

    /// `self`'s inputs restricted to `atoms`, unioned with every label in
    /// `carryover` (efficient ddmin's "insert_atomic_inputs", spec §4.8).
    pub fn atomic_input_subset_with_carryover(&self, atoms: &[Atom], carryover: &[Atom]) -> EventDag {
        let labels: HashSet<Label> = atoms
            .iter()
            .chain(carryover.iter())
            .flatten()
            .cloned()
            .collect();
        self.input_subset(&labels)
    }

    /// Drops recorded sequences that cannot possibly replay: a recovery
    /// whose matching entity was never previously failed in the surviving
    /// input sequence (spec §3).
    pub fn mark_invalid_input_sequences(&self) -> EventDag {
        let mut down: HashSet<(&'static str, u64, u64)> = HashSet::new();
        let mut valid_labels: HashSet<Label> = HashSet::new();
        for input in self.input_events() {
            match input.atom_key() {
                None => {
                    valid_labels.insert(input.label.clone());
                }
                Some(key) => {
                    if input.is_recovery() {
                        if down.remove(&key) {
                            valid_labels.insert(input.label.clone());
                        }
                        // else: recovery without a prior failure, drop it.
                    } else {
                        down.insert(key);
                        valid_labels.insert(input.label.clone());
                    }
                }
            }
        }
        self.input_subset(&valid_labels)
    }

    /// Drops event classes the scheduler cannot interpret. `supported`
    /// names the classes to keep; everything else (including its closure of
    /// internal dependents) is pruned.
    pub fn filter_unsupported_input_types(&self, supported: &HashSet<&str>) -> EventDag {
        let valid_labels: HashSet<Label> = self
            .input_events()
            .into_iter()
            .filter(|e| supported.contains(e.kind.class_name()))
            .map(|e| e.label.clone())
            .collect();
        self.input_subset(&valid_labels)
    }
}

/// Splits `items` into `ways` roughly equal contiguous subsets (ddmin's
/// partitioning step, spec §4.7/§4.8).
pub fn split_list<T: Clone>(items: &[T], ways: usize) -> Vec<Vec<T>> {
    let ways = ways.max(1);
    let n = items.len();
    let base = n / ways;
    let extra = n % ways;
    let mut out = Vec::with_capacity(ways);
    let mut start = 0;
    for i in 0..ways {
        let size = base + usize::from(i < extra);
        let end = start + size;
        out.push(items[start..end].to_vec());
        start = end;
    }
    out
}
