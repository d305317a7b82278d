//! Variable substitutions

use crate::logic::formula::{Formula, Node};
use crate::logic::symbols::VariableId;
use std::collections::HashMap;

/// A substitution mapping variable IDs to formulas.
///
/// Substitutions produced by unification are idempotent: no right-hand side
/// mentions a bound variable, so applying the substitution once is the same
/// as applying all of its bindings in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    pub map: HashMap<VariableId, Formula>,
}

impl Substitution {
    /// Create a new empty substitution
    pub fn new() -> Self {
        Substitution {
            map: HashMap::new(),
        }
    }

    /// Add a variable -> formula mapping as is
    pub fn insert(&mut self, var: VariableId, formula: Formula) {
        self.map.insert(var, formula);
    }

    /// Add `var -> formula`, first applying the new binding to every existing
    /// right-hand side.
    ///
    /// `formula` must already have this substitution applied and must not
    /// contain `var`; the unifier guarantees both through its occurs check.
    pub fn compose_binding(&mut self, var: VariableId, formula: Formula) {
        let single = Substitution {
            map: HashMap::from([(var, formula.clone())]),
        };
        for existing in self.map.values_mut() {
            if existing.contains_variable(var) {
                *existing = existing.substitute(&single);
            }
        }
        self.map.insert(var, formula);
    }

    /// Get the formula bound to a variable, if any
    pub fn get(&self, var: VariableId) -> Option<&Formula> {
        self.map.get(&var)
    }

    pub fn contains(&self, var: VariableId) -> bool {
        self.map.contains_key(&var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Formula {
    /// Apply a substitution. Subtrees without bound variables are shared with
    /// the input rather than copied.
    pub fn substitute(&self, subst: &Substitution) -> Formula {
        if subst.is_empty() {
            return self.clone();
        }
        match self.node() {
            Node::Variable(v) => subst.get(*v).cloned().unwrap_or_else(|| self.clone()),
            Node::Operator(symbol, children) => {
                let replaced: Vec<Formula> = children.iter().map(|c| c.substitute(subst)).collect();
                if replaced.iter().zip(children).all(|(new, old)| new.ptr_eq(old)) {
                    self.clone()
                } else {
                    Formula::rebuild(*symbol, replaced)
                }
            }
        }
    }
}

/// Free-function form of [`Formula::substitute`]
pub fn substitute(formula: &Formula, subst: &Substitution) -> Formula {
    formula.substitute(subst)
}
