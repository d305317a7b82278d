//! One-way schema matching

use super::{Substitution, UnificationError, UnificationResult};
use crate::logic::formula::{Formula, Node};

/// One-way match: find σ such that `schema σ = formula`.
///
/// Only variables of the schema are bound; variables of `formula` are
/// treated as opaque leaves, so the two may reuse the same IDs.
pub fn is_schema_of(schema: &Formula, formula: &Formula) -> UnificationResult {
    let mut subst = Substitution::new();
    match_with_subst(schema, formula, &mut subst)?;
    Ok(subst)
}

fn match_with_subst(
    schema: &Formula,
    formula: &Formula,
    subst: &mut Substitution,
) -> Result<(), UnificationError> {
    match (schema.node(), formula.node()) {
        // Schema variable matches anything, consistently
        (Node::Variable(v), _) => {
            if let Some(bound) = subst.get(*v) {
                if bound == formula {
                    Ok(())
                } else {
                    Err(UnificationError::BindingConflict(*v))
                }
            } else {
                subst.insert(*v, formula.clone());
                Ok(())
            }
        }
        (Node::Operator(s1, args1), Node::Operator(s2, args2)) => {
            if s1.id != s2.id {
                return Err(UnificationError::OperatorClash(s1.id, s2.id));
            }
            if args1.len() != args2.len() {
                return Err(UnificationError::ArityMismatch {
                    operator: s1.id,
                    left: args1.len(),
                    right: args2.len(),
                });
            }
            for (arg1, arg2) in args1.iter().zip(args2) {
                match_with_subst(arg1, arg2, subst)?;
            }
            Ok(())
        }
        (Node::Operator(s, _), Node::Variable(v)) => {
            Err(UnificationError::OperatorAgainstVariable(s.id, *v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{SymbolTable, VariableId};

    fn polish(text: &str, symbols: &SymbolTable) -> Formula {
        Formula::parse_polish(text, symbols).unwrap()
    }

    #[test]
    fn test_self_implication_is_schema() {
        let symbols = SymbolTable::classical();
        // Imply(x, x) against Imply(Imply(a, b), Imply(a, b))
        let schema = polish("Cxx", &symbols);
        let formula = polish("CCabCab", &symbols);

        let sigma = is_schema_of(&schema, &formula).unwrap();
        assert_eq!(sigma.len(), 1);
        assert_eq!(
            sigma.get(VariableId::new(0)),
            Some(&polish("Cab", &symbols))
        );
        assert_eq!(schema.substitute(&sigma), formula);
    }

    #[test]
    fn test_negated_copy_is_not_schema() {
        let symbols = SymbolTable::classical();
        // Imply(x, Not(x)) against Imply(Imply(a, b), Imply(a, b))
        let schema = polish("CxNx", &symbols);
        let formula = polish("CCabCab", &symbols);
        assert!(is_schema_of(&schema, &formula).is_err());
    }

    #[test]
    fn test_no_match_operator_against_variable() {
        let symbols = SymbolTable::classical();
        let schema = polish("Np", &symbols);
        let formula = polish("p", &symbols);
        assert!(matches!(
            is_schema_of(&schema, &formula),
            Err(UnificationError::OperatorAgainstVariable(_, _))
        ));
    }

    #[test]
    fn test_inconsistent_binding() {
        let symbols = SymbolTable::classical();
        // C(N0, 0) does not match C(N0, C(0, 1))
        let schema = polish("CNpp", &symbols);
        let formula = polish("CNpCpq", &symbols);
        assert!(matches!(
            is_schema_of(&schema, &formula),
            Err(UnificationError::BindingConflict(_))
        ));
    }

    #[test]
    fn test_variable_renaming_is_schema_both_ways() {
        let symbols = SymbolTable::classical();
        let a = polish("CpCqp", &symbols);
        let b = a.shift_variables(4);
        assert!(is_schema_of(&a, &b).is_ok());
        assert!(is_schema_of(&b, &a).is_ok());
    }

    #[test]
    fn test_identification_of_variables() {
        let symbols = SymbolTable::classical();
        // C0.1 generalizes C0.0 but not the other way round
        let general = polish("Cpq", &symbols);
        let special = polish("Cpp", &symbols);
        assert!(is_schema_of(&general, &special).is_ok());
        assert!(is_schema_of(&special, &general).is_err());
    }
}
