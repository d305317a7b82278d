//! Property-based tests for unification and schema matching using proptest.

use proptest::prelude::*;

use super::{is_schema_of, try_unify_trees, Substitution};
use crate::logic::{Formula, SymbolTable, VariableId};

/// Formula description (before building against a symbol table)
#[derive(Debug, Clone)]
enum FormulaDesc {
    Var(u8),
    Falsum,
    Not(Box<FormulaDesc>),
    Imply(Box<FormulaDesc>, Box<FormulaDesc>),
}

fn arb_formula_desc(max_depth: u32) -> BoxedStrategy<FormulaDesc> {
    let leaf = prop_oneof![
        4 => (0..4u8).prop_map(FormulaDesc::Var),
        1 => Just(FormulaDesc::Falsum),
    ];
    if max_depth == 0 {
        leaf.boxed()
    } else {
        let inner = arb_formula_desc(max_depth - 1);
        prop_oneof![
            3 => leaf,
            1 => inner.clone().prop_map(|d| FormulaDesc::Not(Box::new(d))),
            3 => (inner.clone(), inner)
                .prop_map(|(a, b)| FormulaDesc::Imply(Box::new(a), Box::new(b))),
        ]
        .boxed()
    }
}

fn symbols() -> SymbolTable {
    let table = SymbolTable::classical();
    table.register_operator('F', 0).unwrap();
    table
}

fn build(desc: &FormulaDesc, symbols: &SymbolTable) -> Formula {
    match desc {
        FormulaDesc::Var(i) => Formula::var(*i as u32),
        FormulaDesc::Falsum => Formula::operator(symbols.get('F').unwrap(), vec![]).unwrap(),
        FormulaDesc::Not(a) => {
            Formula::operator(symbols.negation().unwrap(), vec![build(a, symbols)]).unwrap()
        }
        FormulaDesc::Imply(a, b) => Formula::operator(
            symbols.implication().unwrap(),
            vec![build(a, symbols), build(b, symbols)],
        )
        .unwrap(),
    }
}

/// Pair of formulas with disjoint variables
fn arb_formula_pair(max_depth: u32) -> impl Strategy<Value = (Formula, Formula)> {
    (arb_formula_desc(max_depth), arb_formula_desc(max_depth)).prop_map(|(d1, d2)| {
        let symbols = symbols();
        (build(&d1, &symbols), build(&d2, &symbols).shift_variables(4))
    })
}

/// A formula together with a substitution for its variables
fn arb_instance(max_depth: u32) -> impl Strategy<Value = (Formula, Substitution)> {
    (
        arb_formula_desc(max_depth),
        proptest::collection::vec(arb_formula_desc(2), 4),
    )
        .prop_map(|(desc, images)| {
            let symbols = symbols();
            let mut sigma = Substitution::new();
            for (i, image) in images.iter().enumerate() {
                sigma.insert(VariableId::new(i as u32), build(image, &symbols).shift_variables(8));
            }
            (build(&desc, &symbols), sigma)
        })
}

// =========================================================================
// Unification properties
// =========================================================================

proptest! {
    /// Soundness: if unify(a, b) = σ, then aσ = bσ
    #[test]
    fn unification_soundness((a, b) in arb_formula_pair(4)) {
        if let Ok(sigma) = try_unify_trees(&a, &b) {
            prop_assert_eq!(a.substitute(&sigma), b.substitute(&sigma), "unifier must make formulas equal");
        }
    }

    /// Symmetry: unify(a, b) succeeds iff unify(b, a) succeeds
    #[test]
    fn unification_symmetry((a, b) in arb_formula_pair(4)) {
        let r1 = try_unify_trees(&a, &b);
        let r2 = try_unify_trees(&b, &a);
        prop_assert_eq!(r1.is_ok(), r2.is_ok(), "unification should be symmetric");
    }

    /// Idempotence: no right-hand side mentions a bound variable
    #[test]
    fn unifier_is_idempotent((a, b) in arb_formula_pair(4)) {
        if let Ok(sigma) = try_unify_trees(&a, &b) {
            for value in sigma.map.values() {
                for var in sigma.map.keys() {
                    prop_assert!(!value.contains_variable(*var));
                }
            }
        }
    }

    /// Identity: a formula unifies with itself without changing
    #[test]
    fn unification_identity(desc in arb_formula_desc(4)) {
        let f = build(&desc, &symbols());
        let sigma = try_unify_trees(&f, &f);
        prop_assert!(sigma.is_ok());
        if let Ok(sigma) = sigma {
            prop_assert!(sigma.is_empty());
        }
    }

    /// A formula always unifies with any of its instances
    #[test]
    fn unification_with_instance((f, sigma) in arb_instance(3)) {
        let instance = f.substitute(&sigma);
        prop_assert!(try_unify_trees(&f, &instance).is_ok());
    }

    /// Occurs check: 0 never unifies with N^k(0)
    #[test]
    fn unification_occurs_check(depth in 1..4usize) {
        let symbols = symbols();
        let neg = symbols.negation().unwrap();
        let mut f = Formula::var(0);
        for _ in 0..depth {
            f = Formula::operator(neg, vec![f]).unwrap();
        }
        prop_assert!(try_unify_trees(&Formula::var(0), &f).is_err());
    }
}

// =========================================================================
// Schema matching properties
// =========================================================================

proptest! {
    /// Soundness: if is_schema_of(s, f) = σ, then sσ = f
    #[test]
    fn matching_soundness((s, f) in arb_formula_pair(3)) {
        if let Ok(sigma) = is_schema_of(&s, &f) {
            prop_assert_eq!(s.substitute(&sigma), f);
        }
    }

    /// Completeness: a formula is a schema of each of its instances
    #[test]
    fn matching_completeness((f, sigma) in arb_instance(3)) {
        let instance = f.substitute(&sigma);
        let found = is_schema_of(&f, &instance);
        prop_assert!(found.is_ok());
        if let Ok(found) = found {
            prop_assert_eq!(f.substitute(&found), instance);
        }
    }

    /// A schema is never longer than its instances
    #[test]
    fn schema_standard_length_is_monotone((f, sigma) in arb_instance(3)) {
        let instance = f.substitute(&sigma);
        prop_assert!(f.standard_length() <= instance.standard_length());
    }
}

// =========================================================================
// Canonical key properties
// =========================================================================

proptest! {
    /// Keys of normalized formulas parse back to the same formula
    #[test]
    fn key_roundtrip(desc in arb_formula_desc(4)) {
        let symbols = symbols();
        let f = build(&desc, &symbols).normalized();
        let key = f.key(&symbols);
        prop_assert_eq!(Formula::from_key(&key, &symbols).unwrap(), f);
    }

    /// Renaming variables apart does not change the normalized key
    #[test]
    fn key_invariant_under_renaming(desc in arb_formula_desc(4), offset in 1..20u32) {
        let symbols = symbols();
        let f = build(&desc, &symbols);
        prop_assert_eq!(
            f.normalized().key(&symbols),
            f.shift_variables(offset).normalized().key(&symbols)
        );
    }
}
