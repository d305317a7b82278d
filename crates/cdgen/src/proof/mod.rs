//! Proof strings, their pools and the representative proof set
//!
//! A proof is a condensed-detachment string such as `DD211`: digits refer to
//! axioms and `D` combines the two following subproofs. Its length is the
//! string length, always odd.

pub mod parser;
pub mod store;

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::logic::Formula;

pub use parser::{CondensedDetachment, ParseFailure, ProofParser};
pub use store::{ProofStore, StoredProof};

/// Proof strings partitioned by exact length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofPools {
    by_length: BTreeMap<usize, Vec<String>>,
}

impl ProofPools {
    pub fn new() -> Self {
        ProofPools::default()
    }

    /// Add a proof to the pool of its length. Pools are kept sorted and free
    /// of duplicates.
    pub fn insert(&mut self, proof: impl Into<String>) {
        let proof = proof.into();
        let pool = self.by_length.entry(proof.len()).or_default();
        if let Err(pos) = pool.binary_search(&proof) {
            pool.insert(pos, proof);
        }
    }

    /// Length of the longest known proof, 0 when empty
    pub fn known_limit(&self) -> usize {
        self.by_length.keys().next_back().copied().unwrap_or(0)
    }

    /// Proofs of exactly `length`
    pub fn pool(&self, length: usize) -> &[String] {
        self.by_length.get(&length).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty pools with length at most `max_length`, shortest first
    pub fn up_to(&self, max_length: usize) -> impl Iterator<Item = (usize, &[String])> {
        self.by_length
            .range(..=max_length)
            .filter(|(_, pool)| !pool.is_empty())
            .map(|(&length, pool)| (length, pool.as_slice()))
    }

    /// Total number of proofs over all lengths
    pub fn len(&self) -> usize {
        self.by_length.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Into<String>> FromIterator<S> for ProofPools {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut pools = ProofPools::new();
        for proof in iter {
            pools.insert(proof);
        }
        pools
    }
}

/// Shortest known proof of one conclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representative {
    pub proof: String,
    pub conclusion: Formula,
}

impl Representative {
    pub fn length(&self) -> usize {
        self.proof.len()
    }
}

/// Outcome of offering a proof to the representative set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// First proof of this conclusion
    Inserted,
    /// Replaced a longer (or equally long, lexicographically larger) proof
    Replaced,
    /// An equal or better proof was already known
    Rejected,
}

/// Whether `candidate` should replace `incumbent` as the proof of a
/// conclusion: shorter wins, and among equally long proofs the
/// lexicographically smallest wins.
pub fn prefers(candidate: &str, incumbent: &str) -> bool {
    (candidate.len(), candidate) < (incumbent.len(), incumbent)
}

/// Map from conclusion key to its shortest known proof
#[derive(Debug, Clone, Default)]
pub struct Representatives {
    entries: IndexMap<String, Representative>,
}

impl Representatives {
    pub fn new() -> Self {
        Representatives::default()
    }

    /// Offer a proof of the conclusion with the given key
    pub fn offer(&mut self, key: String, proof: String, conclusion: Formula) -> Offer {
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if prefers(&proof, &existing.proof) {
                    *existing = Representative { proof, conclusion };
                    Offer::Replaced
                } else {
                    Offer::Rejected
                }
            }
            None => {
                self.entries.insert(key, Representative { proof, conclusion });
                Offer::Inserted
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Representative> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry, keeping the insertion order of the others
    pub fn remove(&mut self, key: &str) -> Option<Representative> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Representative)> {
        self.entries.iter()
    }

    /// Entries whose proof has exactly `length` characters
    pub fn of_length(&self, length: usize) -> impl Iterator<Item = (&String, &Representative)> {
        self.entries.iter().filter(move |(_, rep)| rep.length() == length)
    }

    /// Length of the longest representative proof, 0 when empty
    pub fn known_limit(&self) -> usize {
        self.entries.values().map(Representative::length).max().unwrap_or(0)
    }

    /// The proofs, partitioned by length
    pub fn pools(&self) -> ProofPools {
        self.entries.values().map(|rep| rep.proof.as_str()).collect()
    }
}
