//! Schema matching, unification, and substitution for formulas

mod matching;
pub mod mgu;
pub mod substitution;

#[cfg(test)]
mod proptest_tests;

pub use matching::is_schema_of;
pub use mgu::{try_unify_trees, UnificationError, UnificationResult};
pub use substitution::{substitute, Substitution};
