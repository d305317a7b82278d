//! Shared-memory redundancy filter
//!
//! Phase one scans all candidates in parallel and collects the redundant
//! ones in a concurrent set; phase two, run by the caller, erases them. The
//! snapshot is read-only during the scan, so no entry disappears while
//! another thread is still matching against it.

use dashmap::DashSet;
use rayon::prelude::*;
use tracing::info;

use super::RedundancyCheck;
use crate::Result;

/// Candidate indices whose conclusion is schema-subsumed, in ascending order
pub fn find_redundant(check: &RedundancyCheck) -> Result<Vec<u64>> {
    let redundant: DashSet<u64> = DashSet::new();
    (0..check.candidate_count())
        .into_par_iter()
        .try_for_each(|candidate| -> Result<()> {
            if check.is_redundant(candidate)? {
                redundant.insert(candidate);
            }
            Ok(())
        })?;

    let mut found: Vec<u64> = redundant.into_iter().collect();
    found.sort_unstable();
    info!(
        candidates = check.candidate_count(),
        redundant = found.len(),
        "local redundancy filter finished"
    );
    Ok(found)
}
