//! cdgen: shortest condensed-detachment proofs
//!
//! This library enumerates the condensed-detachment proofs of a Hilbert-style
//! calculus length by length, keeps one shortest proof per conclusion and
//! discards conclusions that are instances of a known schema, either on one
//! machine or cooperatively across ranks.

pub mod config;
pub mod distributed;
pub mod error;
pub mod filter;
pub mod generation;
pub mod logic;
pub mod proof;
pub mod stats;

pub use error::{Error, Result};

// Re-export commonly used types
pub use config::{DistributedConfig, GeneratorConfig};
pub use distributed::{DistributedFilter, LocalHub, TcpTransport, Transport};
pub use filter::{find_redundant, LengthClassIndex, RedundancyCheck};
pub use generation::{enumerate_candidates, Generator};
pub use logic::{is_schema_of, try_unify_trees, Formula, Substitution, SymbolTable};
pub use proof::{
    CondensedDetachment, ParseFailure, ProofParser, ProofPools, ProofStore, Representatives,
};
pub use stats::{FilterStats, GenerationStats};
