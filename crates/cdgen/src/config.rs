//! Generator and distributed-filter configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one generation run
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Worker threads for candidate processing (1 means sequential)
    pub threads: usize,
    /// A worker deque below this many entries is considered starved
    pub low_water_mark: usize,
    /// Remove schema-subsumed conclusions after each length
    pub redundancy_filter: bool,
    /// Directory holding the `dProofs<k>.txt` collections
    pub data_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            threads: available_threads(),
            low_water_mark: 32,
            redundancy_filter: true,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl GeneratorConfig {
    /// Sequential configuration, mostly useful for tests and tiny lengths.
    pub fn sequential() -> Self {
        GeneratorConfig {
            threads: 1,
            ..Default::default()
        }
    }
}

/// Configuration for the distributed redundancy filter
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    /// Cadence at which the communication thread polls, independent of
    /// wakeups from the worker
    pub poll_interval: Duration,
    /// Ranges shorter than this are never split into active and reservable parts
    pub min_chunk_size: u64,
    /// The reservable part of a split range is `1 / reservable_denominator` of it
    pub reservable_denominator: u64,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        DistributedConfig {
            poll_interval: Duration::from_millis(50),
            min_chunk_size: 64,
            reservable_denominator: 3,
        }
    }
}

impl DistributedConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.reservable_denominator < 2 {
            return Err(crate::Error::Config(format!(
                "reservable denominator must be at least 2, got {}",
                self.reservable_denominator
            )));
        }
        if self.min_chunk_size == 0 {
            return Err(crate::Error::Config(
                "minimum chunk size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of hardware threads, falling back to 1 when unknown.
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
