//! Length-class index over known conclusions
//!
//! Standard length gives a necessary condition for schema matching: if `s`
//! is a schema of `f`, then `standard_length(s) <= standard_length(f)`,
//! because substitution only replaces length-1 variable leaves by formulas of
//! length at least 1. Grouping conclusions by standard length lets a lookup
//! skip every class longer than its target.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::logic::Formula;

/// Map from standard length to the ids of the conclusions with that length.
/// Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct LengthClassIndex {
    classes: BTreeMap<usize, Vec<usize>>,
}

impl LengthClassIndex {
    pub fn new() -> Self {
        LengthClassIndex::default()
    }

    /// Index `conclusions` by position
    pub fn build<'a>(conclusions: impl IntoIterator<Item = &'a Formula>) -> Self {
        let mut index = LengthClassIndex::new();
        for (id, formula) in conclusions.into_iter().enumerate() {
            index.insert(id, formula.standard_length());
        }
        index
    }

    pub fn insert(&mut self, id: usize, standard_length: usize) {
        self.classes.entry(standard_length).or_default().push(id);
    }

    /// Ids with exactly this standard length
    pub fn class(&self, standard_length: usize) -> &[usize] {
        self.classes
            .get(&standard_length)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Classes whose standard length lies in `lengths`, shortest first
    pub fn classes_in(
        &self,
        lengths: RangeInclusive<usize>,
    ) -> impl Iterator<Item = (usize, &[usize])> {
        self.classes
            .range(lengths)
            .map(|(&length, ids)| (length, ids.as_slice()))
    }

    /// Ids of all conclusions that could be a schema of a formula with the
    /// given standard length
    pub fn schema_candidates(&self, standard_length: usize) -> impl Iterator<Item = usize> + '_ {
        self.classes_in(0..=standard_length)
            .flat_map(|(_, ids)| ids.iter().copied())
    }

    /// Number of distinct standard lengths
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
