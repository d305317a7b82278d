//! Operator symbol table
//!
//! Operators are registered in a `SymbolTable` that is created by the caller
//! and passed to everything that builds, prints or parses formulas; there is
//! no process-wide registry. Registration takes the write lock and bumps a
//! monotonic generation counter, so a reader holding derived data (a cached
//! lookup, a printed key) can detect that the table changed since.
//!
//! Variables are not interned: they are plain numbers, `0, 1, 2, …` in
//! first-occurrence order once a formula is normalized.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use crate::{Error, Result};

/// ID of a registered operator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId(pub(crate) u32);

/// ID of a propositional variable
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub(crate) u32);

impl OperatorId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl VariableId {
    pub fn new(id: u32) -> Self {
        VariableId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operator together with its fixed arity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorSymbol {
    pub id: OperatorId,
    pub arity: u8,
}

/// Name used for implication in keys and Polish notation
pub const IMPLICATION: char = 'C';
/// Name used for negation in keys and Polish notation
pub const NEGATION: char = 'N';

#[derive(Debug, Clone, Default)]
struct OperatorArena {
    names: Vec<char>,
    arities: Vec<u8>,
    lookup: HashMap<char, u32>,
}

/// Registry of operator names and arities
#[derive(Debug, Default)]
pub struct SymbolTable {
    arena: RwLock<OperatorArena>,
    generation: AtomicU64,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Create a table with implication (`C`, binary) and negation (`N`, unary)
    pub fn classical() -> Self {
        let table = SymbolTable::new();
        // Fresh table, neither name can clash.
        let _ = table.register_operator(IMPLICATION, 2);
        let _ = table.register_operator(NEGATION, 1);
        table
    }

    /// Register an operator, returning its symbol (get-or-create).
    ///
    /// Names must be ASCII letters outside the lowercase range, which is
    /// reserved for variables in Polish input. Re-registering a name with a
    /// different arity is an error.
    pub fn register_operator(&self, name: char, arity: u8) -> Result<OperatorSymbol> {
        if !name.is_ascii_uppercase() {
            return Err(Error::Config(format!(
                "operator name must be an uppercase ASCII letter, got {:?}",
                name
            )));
        }
        if arity > 2 {
            return Err(Error::Config(format!(
                "operator {} has arity {}, at most 2 is supported",
                name, arity
            )));
        }

        let mut arena = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&id) = arena.lookup.get(&name) {
            let existing = arena.arities[id as usize];
            if existing != arity {
                return Err(Error::Config(format!(
                    "operator {} already registered with arity {}",
                    name, existing
                )));
            }
            return Ok(OperatorSymbol {
                id: OperatorId(id),
                arity,
            });
        }

        let id = arena.names.len() as u32;
        arena.names.push(name);
        arena.arities.push(arity);
        arena.lookup.insert(name, id);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(OperatorSymbol {
            id: OperatorId(id),
            arity,
        })
    }

    /// Take a read view for a batch of lookups.
    pub fn read(&self) -> SymbolsView<'_> {
        SymbolsView {
            arena: self.arena.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Look up an operator by name
    pub fn get(&self, name: char) -> Option<OperatorSymbol> {
        self.read().get(name)
    }

    /// Resolve an operator ID to its name
    pub fn name(&self, id: OperatorId) -> char {
        self.read().name(id)
    }

    /// The binary implication operator, if registered
    pub fn implication(&self) -> Option<OperatorSymbol> {
        self.get(IMPLICATION)
    }

    /// The unary negation operator, if registered
    pub fn negation(&self) -> Option<OperatorSymbol> {
        self.get(NEGATION)
    }

    /// Number of registered operators
    pub fn len(&self) -> usize {
        self.read().arena.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registrations so far; never decreases.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Read-locked view of a `SymbolTable`
pub struct SymbolsView<'a> {
    arena: RwLockReadGuard<'a, OperatorArena>,
}

impl SymbolsView<'_> {
    pub fn get(&self, name: char) -> Option<OperatorSymbol> {
        self.arena.lookup.get(&name).map(|&id| OperatorSymbol {
            id: OperatorId(id),
            arity: self.arena.arities[id as usize],
        })
    }

    /// Name of an operator; `?` for IDs from another table.
    pub fn name(&self, id: OperatorId) -> char {
        self.arena.names.get(id.0 as usize).copied().unwrap_or('?')
    }
}
