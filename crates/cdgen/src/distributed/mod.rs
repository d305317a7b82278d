//! Redundancy filtering across memory-isolated ranks
//!
//! Every rank loads the same representatives, builds the same
//! [`RedundancyCheck`] and runs [`DistributedFilter`]; the candidate indices
//! are balanced between ranks by work stealing and rank 0 receives the
//! redundant ones.

pub mod balancer;
pub mod protocol;
pub mod transport;

use tracing::info;

use crate::config::DistributedConfig;
use crate::filter::RedundancyCheck;
use crate::Result;

pub use balancer::{DistributedFilter, FilterOutcome, Phase};
pub use protocol::{Message, Tag, WorkRange};
pub use transport::{LocalHub, LocalTransport, TcpTransport, Transport};

/// Run a redundancy check across all ranks of `transport`. Rank 0 gets the
/// keys of the redundant candidates; other ranks get `None`.
pub fn filter_redundant<T: Transport + ?Sized>(
    check: &RedundancyCheck,
    transport: &T,
    config: DistributedConfig,
) -> Result<(Option<Vec<String>>, FilterOutcome)> {
    let filter = DistributedFilter::new(transport, config)?;
    let outcome = filter.run(check.candidate_count(), |i| check.is_redundant(i))?;
    let keys = outcome
        .redundant
        .as_deref()
        .map(|indices| check.candidate_keys(indices));
    if let Some(keys) = &keys {
        info!(
            candidates = check.candidate_count(),
            redundant = keys.len(),
            "distributed redundancy filter finished"
        );
    }
    Ok((keys, outcome))
}
