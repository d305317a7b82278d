//! Error types for proof generation and filtering

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A formula tree violates its structural invariants, e.g. two nodes
    /// carrying the same operator with different child counts.
    #[error("Corrupted formula: {0}")]
    CorruptedFormula(String),

    /// Ranks loaded different amounts of input; the distributed pass cannot
    /// proceed because global index bookkeeping would be wrong.
    #[error("Loaded input sizes differ across ranks: {0:?}")]
    SizeMismatch(Vec<u64>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
