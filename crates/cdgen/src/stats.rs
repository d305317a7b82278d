//! Counters for generation runs and filtering passes
//!
//! Serialized to JSON by the `--stats` option of the binary. All `Duration`
//! fields are serialized as `f64` seconds.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::Duration;

fn secs(d: &Duration) -> f64 {
    d.as_secs_f64()
}

/// Statistics for generating one proof length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationStats {
    pub length: usize,
    /// Candidate strings emitted by the enumerator
    pub candidates: u64,
    /// Candidates without a conclusion (e.g. premises that do not unify)
    pub parse_failures: u64,
    /// Candidates whose conclusion was already known, or was reached by another
    /// candidate of this length
    pub duplicate_conclusions: u64,
    /// New representatives before redundancy filtering
    pub accepted: usize,
    /// New representatives removed by the redundancy filter
    pub redundant: usize,
    /// Total representatives after this length
    pub representatives: usize,
    /// Deque rebalancing moves performed by the parallel enumerator
    pub moved_batches: u64,
    pub moved_proofs: u64,

    pub enumerate_time: Duration,
    pub filter_time: Duration,
    pub total_time: Duration,
}

impl GenerationStats {
    /// Representatives of this length that survived filtering
    pub fn kept(&self) -> usize {
        self.accepted - self.redundant
    }
}

impl Serialize for GenerationStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("GenerationStats", 12)?;
        s.serialize_field("length", &self.length)?;
        s.serialize_field("candidates", &self.candidates)?;
        s.serialize_field("parse_failures", &self.parse_failures)?;
        s.serialize_field("duplicate_conclusions", &self.duplicate_conclusions)?;
        s.serialize_field("accepted", &self.accepted)?;
        s.serialize_field("redundant", &self.redundant)?;
        s.serialize_field("representatives", &self.representatives)?;
        s.serialize_field("moved_batches", &self.moved_batches)?;
        s.serialize_field("moved_proofs", &self.moved_proofs)?;
        s.serialize_field("enumerate_time", &secs(&self.enumerate_time))?;
        s.serialize_field("filter_time", &secs(&self.filter_time))?;
        s.serialize_field("total_time", &secs(&self.total_time))?;
        s.end()
    }
}

/// Statistics for one rank of a distributed filtering pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStats {
    pub rank: usize,
    /// Indices checked by this rank's worker
    pub processed: u64,
    /// Redundant indices found by this rank's worker
    pub found: u64,
    /// Ranges adopted from this rank's own reservable part
    pub adopted: u64,
    /// Ranges reserved from peers
    pub stolen: u64,
    /// Reservation attempts that peers rejected
    pub rejected_attempts: u64,
    /// Ranges given away to peers
    pub given: u64,
    pub elapsed: Duration,
}

impl Serialize for FilterStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FilterStats", 8)?;
        s.serialize_field("rank", &self.rank)?;
        s.serialize_field("processed", &self.processed)?;
        s.serialize_field("found", &self.found)?;
        s.serialize_field("adopted", &self.adopted)?;
        s.serialize_field("stolen", &self.stolen)?;
        s.serialize_field("rejected_attempts", &self.rejected_attempts)?;
        s.serialize_field("given", &self.given)?;
        s.serialize_field("elapsed", &secs(&self.elapsed))?;
        s.end()
    }
}
