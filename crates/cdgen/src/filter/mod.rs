//! Redundancy elimination for newly generated representatives
//!
//! A representative of the just-generated length is redundant when some other
//! known conclusion is a schema of its conclusion: every theorem it proves is
//! already reachable from that schema at equal or lower cost. Checks are
//! addressed by a dense candidate index `0..n`, so the same decision can be
//! computed locally (`local`) or split across ranks (`crate::distributed`).

pub mod index;
pub mod local;

use tracing::{debug, error};

use crate::logic::{is_schema_of, Formula};
use crate::proof::Representatives;
use crate::{Error, Result};

pub use index::LengthClassIndex;
pub use local::find_redundant;

/// Immutable snapshot of the known conclusions for one filtering pass
#[derive(Debug)]
pub struct RedundancyCheck {
    keys: Vec<String>,
    conclusions: Vec<Formula>,
    index: LengthClassIndex,
    /// Positions in `conclusions` of the candidates, sorted by key
    candidates: Vec<usize>,
}

impl RedundancyCheck {
    /// Snapshot `representatives`, taking those with proof length
    /// `target_length` as the candidates to check.
    pub fn new(representatives: &Representatives, target_length: usize) -> Self {
        let mut keys = Vec::with_capacity(representatives.len());
        let mut conclusions = Vec::with_capacity(representatives.len());
        let mut candidates = Vec::new();
        for (position, (key, rep)) in representatives.iter().enumerate() {
            if rep.length() == target_length {
                candidates.push(position);
            }
            keys.push(key.clone());
            conclusions.push(rep.conclusion.clone());
        }
        // Ranks agree on candidate numbering regardless of insertion order
        candidates.sort_unstable_by(|&a, &b| keys[a].cmp(&keys[b]));
        let index = LengthClassIndex::build(&conclusions);
        debug!(
            target_length,
            candidates = candidates.len(),
            known = conclusions.len(),
            classes = index.class_count(),
            "built redundancy check"
        );
        RedundancyCheck {
            keys,
            conclusions,
            index,
            candidates,
        }
    }

    pub fn candidate_count(&self) -> u64 {
        self.candidates.len() as u64
    }

    pub fn candidate_key(&self, candidate: u64) -> &str {
        &self.keys[self.candidates[candidate as usize]]
    }

    /// Keys of the given candidate indices
    pub fn candidate_keys(&self, candidates: &[u64]) -> Vec<String> {
        candidates
            .iter()
            .map(|&c| self.candidate_key(c).to_string())
            .collect()
    }

    /// Whether some other known conclusion is a schema of candidate
    /// `candidate`. Panics if `candidate >= candidate_count()`.
    pub fn is_redundant(&self, candidate: u64) -> Result<bool> {
        let target = self.candidates[candidate as usize];
        let formula = &self.conclusions[target];
        for id in self.index.schema_candidates(formula.standard_length()) {
            if id == target {
                continue;
            }
            match is_schema_of(&self.conclusions[id], formula) {
                Ok(_) => {
                    debug!(
                        redundant = %self.keys[target],
                        schema = %self.keys[id],
                        "conclusion is an instance of a known schema"
                    );
                    return Ok(true);
                }
                Err(e) if e.is_corruption() => {
                    error!(schema = %self.keys[id], target = %self.keys[target], "{}", e);
                    return Err(Error::CorruptedFormula(e.to_string()));
                }
                Err(_) => {}
            }
        }
        Ok(false)
    }
}

/// Remove the entries with the given keys, returning how many were present
pub fn remove_redundant(representatives: &mut Representatives, keys: &[String]) -> usize {
    keys.iter()
        .filter(|key| representatives.remove(key).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::SymbolTable;

    fn reps(entries: &[(&str, &str)]) -> Representatives {
        let symbols = SymbolTable::classical();
        let mut reps = Representatives::new();
        for (proof, polish) in entries {
            let f = Formula::parse_polish(polish, &symbols).unwrap();
            reps.offer(f.key(&symbols), proof.to_string(), f);
        }
        reps
    }

    #[test]
    fn test_instance_of_shorter_schema_is_redundant() {
        // Cpp is a schema of CCqrCqr; CpNp is not an instance of Cpp
        let reps = reps(&[("1", "Cpp"), ("D11", "CCqrCqr"), ("D12", "CpNp")]);
        let check = RedundancyCheck::new(&reps, 3);
        assert_eq!(check.candidate_count(), 2);
        let verdicts: Vec<(String, bool)> = (0..check.candidate_count())
            .map(|i| (check.candidate_key(i).to_string(), check.is_redundant(i).unwrap()))
            .collect();
        assert!(verdicts.contains(&("CC0.1C0.1".to_string(), true)));
        assert!(verdicts.contains(&("C0N0".to_string(), false)));
    }

    #[test]
    fn test_same_length_schema_counts() {
        let reps = reps(&[("D11", "Cpq"), ("D12", "CpNq")]);
        let check = RedundancyCheck::new(&reps, 3);
        let redundant: Vec<String> = (0..check.candidate_count())
            .filter(|&i| check.is_redundant(i).unwrap())
            .map(|i| check.candidate_key(i).to_string())
            .collect();
        assert_eq!(redundant, vec!["C0N1".to_string()]);
    }

    #[test]
    fn test_candidates_sorted_by_key() {
        let reps = reps(&[("D12", "Np"), ("D11", "Cpq"), ("1", "p")]);
        let check = RedundancyCheck::new(&reps, 3);
        assert_eq!(check.candidate_keys(&[0, 1]), vec!["C0.1", "N0"]);
    }

    #[test]
    fn test_remove_redundant() {
        let mut reps = reps(&[("1", "Cpp"), ("D11", "CCqrCqr")]);
        let removed = remove_redundant(&mut reps, &["CC0.1C0.1".to_string(), "missing".into()]);
        assert_eq!(removed, 1);
        assert_eq!(reps.len(), 1);
    }
}
