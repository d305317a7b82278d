//! Propositional formulas and the algorithms that compare them
//!
//! This module provides the formula trees, the operator symbol table, and
//! schema matching and unification over formulas.

pub mod formula;
pub mod symbols;
pub mod unification;

// Re-export commonly used types
pub use formula::{Formula, FormulaDisplay, Node};
pub use symbols::{OperatorId, OperatorSymbol, SymbolTable, VariableId};
pub use unification::{
    is_schema_of, substitute, try_unify_trees, Substitution, UnificationError,
    UnificationResult,
};
