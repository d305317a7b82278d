//! Most general unifiers by lazy Robinson unification
//!
//! Instead of rebuilding both substituted trees after every new binding, the
//! unifier walks the two inputs in parallel, resolving bound variables only
//! where the walk reaches them, and stops at the first pair of subtrees that
//! differ. That pair either fails unification or yields one new binding,
//! which is composed into the substitution before the walk restarts. Every
//! round eliminates a variable, so the loop terminates; the unifier itself
//! can still be exponentially larger than its inputs.

use super::substitution::Substitution;
use crate::logic::formula::{Formula, Node};
use crate::logic::symbols::{OperatorId, VariableId};
use thiserror::Error;

/// Result of a unification or matching attempt
pub type UnificationResult = Result<Substitution, UnificationError>;

/// Reasons unification or matching fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnificationError {
    /// Variable occurs in the formula it would be bound to
    #[error("variable {0} occurs in {1}")]
    OccursCheck(VariableId, Formula),
    /// Operators differ
    #[error("operator #{} clashes with #{}", .0.as_u32(), .1.as_u32())]
    OperatorClash(OperatorId, OperatorId),
    /// A schema variable is already bound to a different formula
    #[error("schema variable {0} bound inconsistently")]
    BindingConflict(VariableId),
    /// A schema operator meets a variable of the instance
    #[error("operator #{} cannot match variable {}", .0.as_u32(), .1)]
    OperatorAgainstVariable(OperatorId, VariableId),
    /// Two nodes with the same operator have different child counts; the
    /// trees are corrupted
    #[error("operator #{} appears with {} and {} children", .operator.as_u32(), .left, .right)]
    ArityMismatch {
        operator: OperatorId,
        left: usize,
        right: usize,
    },
}

impl UnificationError {
    /// True for failures that indicate a broken formula tree rather than an
    /// ordinary "does not unify"
    pub fn is_corruption(&self) -> bool {
        matches!(self, UnificationError::ArityMismatch { .. })
    }
}

/// Unify two formulas, returning a most general unifier if one exists.
///
/// Both formulas share one variable namespace; rename them apart first if
/// they should be treated independently.
pub fn try_unify_trees(a: &Formula, b: &Formula) -> UnificationResult {
    let mut subst = Substitution::new();
    while let Some((left, right)) = first_mismatch(a, b, &subst)? {
        let (var, other) = match (left.node(), right.node()) {
            (Node::Variable(v), _) => (*v, right.clone()),
            (_, Node::Variable(v)) => (*v, left.clone()),
            (Node::Operator(l, _), Node::Operator(r, _)) => {
                return Err(UnificationError::OperatorClash(l.id, r.id));
            }
        };
        let other = other.substitute(&subst);
        if other.contains_variable(var) {
            return Err(UnificationError::OccursCheck(var, other));
        }
        subst.compose_binding(var, other);
    }
    Ok(subst)
}

/// Look through a bound variable. Right-hand sides never contain bound
/// variables, so one lookup suffices.
fn resolve<'a>(formula: &'a Formula, subst: &'a Substitution) -> &'a Formula {
    match formula.as_variable() {
        Some(v) => subst.get(v).unwrap_or(formula),
        None => formula,
    }
}

/// Compare `a` and `b` under `subst` without building the substituted
/// trees, returning the first (pre-order) pair of differing subtrees.
fn first_mismatch(
    a: &Formula,
    b: &Formula,
    subst: &Substitution,
) -> Result<Option<(Formula, Formula)>, UnificationError> {
    let a = resolve(a, subst);
    let b = resolve(b, subst);
    if a.ptr_eq(b) {
        return Ok(None);
    }
    match (a.node(), b.node()) {
        (Node::Variable(x), Node::Variable(y)) if x == y => Ok(None),
        (Node::Operator(s1, args1), Node::Operator(s2, args2)) if s1.id == s2.id => {
            if args1.len() != args2.len() {
                return Err(UnificationError::ArityMismatch {
                    operator: s1.id,
                    left: args1.len(),
                    right: args2.len(),
                });
            }
            for (x, y) in args1.iter().zip(args2) {
                if let Some(mismatch) = first_mismatch(x, y, subst)? {
                    return Ok(Some(mismatch));
                }
            }
            Ok(None)
        }
        _ => Ok(Some((a.clone(), b.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::SymbolTable;

    fn polish(text: &str, symbols: &SymbolTable) -> Formula {
        Formula::parse_polish(text, symbols).unwrap()
    }

    #[test]
    fn test_unify_variables() {
        let result = try_unify_trees(&Formula::var(0), &Formula::var(1)).unwrap();
        assert_eq!(result.map.len(), 1);
    }

    #[test]
    fn test_unify_variable_with_formula() {
        let symbols = SymbolTable::classical();
        let f = polish("Cpq", &symbols).shift_variables(1);
        let result = try_unify_trees(&Formula::var(0), &f).unwrap();
        assert_eq!(result.get(VariableId::new(0)), Some(&f));
    }

    #[test]
    fn test_unify_compound() {
        let symbols = SymbolTable::classical();
        // C(0, C(1, 0))  =?=  C(C(2, 2), 3)
        let a = polish("CpCqp", &symbols);
        let b = polish("CCrrs", &symbols).shift_variables(2);
        let sigma = try_unify_trees(&a, &b).unwrap();
        assert_eq!(a.substitute(&sigma), b.substitute(&sigma));
        assert_eq!(
            a.substitute(&sigma).normalized().key(&symbols),
            "CC0.0C1C0.0"
        );
    }

    #[test]
    fn test_occurs_check() {
        let symbols = SymbolTable::classical();
        let np = polish("Np", &symbols);
        let result = try_unify_trees(&Formula::var(0), &np);
        assert!(matches!(result, Err(UnificationError::OccursCheck(_, _))));
    }

    #[test]
    fn test_indirect_occurs_check() {
        let symbols = SymbolTable::classical();
        // C(0, 0) =?= C(1, N1) forces 0 = 1 and then 1 = N1
        let a = polish("Cpp", &symbols);
        let b = polish("CqNq", &symbols).shift_variables(1);
        assert!(matches!(
            try_unify_trees(&a, &b),
            Err(UnificationError::OccursCheck(_, _))
        ));
    }

    #[test]
    fn test_operator_clash() {
        let symbols = SymbolTable::classical();
        let a = polish("Cpq", &symbols);
        let b = polish("Np", &symbols);
        assert!(matches!(
            try_unify_trees(&a, &b),
            Err(UnificationError::OperatorClash(_, _))
        ));
    }

    #[test]
    fn test_arity_mismatch_is_corruption() {
        let symbols = SymbolTable::classical();
        let imp = symbols.implication().unwrap();
        let broken = Formula::rebuild(
            crate::logic::OperatorSymbol { id: imp.id, arity: 1 },
            vec![Formula::var(0)],
        );
        let ok = polish("Cpq", &symbols);
        let err = try_unify_trees(&broken, &ok).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_chain_of_bindings_composes() {
        let symbols = SymbolTable::classical();
        // C(0, C(1, 2)) =?= C(1, C(2, N3))
        let a = polish("CpCqr", &symbols);
        let imp = symbols.implication().unwrap();
        let neg = symbols.negation().unwrap();
        let b = Formula::operator(
            imp,
            vec![
                Formula::var(1),
                Formula::operator(
                    imp,
                    vec![
                        Formula::var(2),
                        Formula::operator(neg, vec![Formula::var(3)]).unwrap(),
                    ],
                )
                .unwrap(),
            ],
        )
        .unwrap();
        let sigma = try_unify_trees(&a, &b).unwrap();
        assert_eq!(a.substitute(&sigma), b.substitute(&sigma));
        for value in sigma.map.values() {
            for var in sigma.map.keys() {
                assert!(!value.contains_variable(*var));
            }
        }
    }
}
