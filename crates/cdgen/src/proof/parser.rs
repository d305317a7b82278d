//! Evaluating condensed-detachment proofs to their conclusions

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::logic::{try_unify_trees, Formula, Node, OperatorSymbol, SymbolTable};
use crate::{Error, Result};

/// Turns a proof string into the formula it proves
pub trait ProofParser: Sync {
    fn parse(&self, proof: &str) -> std::result::Result<Formula, ParseFailure>;

    /// The length-1 proofs, one per axiom
    fn axiom_proofs(&self) -> Vec<String>;

    /// Symbol table the conclusions are built against
    fn symbols(&self) -> &Arc<SymbolTable>;
}

/// Why a proof string has no conclusion. Generated candidates fail routinely;
/// these are counted, not reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("empty proof")]
    Empty,
    #[error("unexpected character {ch:?} at {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("detachment at {0} is missing a premise")]
    MissingPremise(usize),
    #[error("{0} subproofs left over")]
    DanglingPremises(usize),
    #[error("major premise of detachment at {0} is not an implication")]
    NotAnImplication(usize),
    #[error("premises of detachment at {0} do not unify")]
    NotUnifiable(usize),
    #[error("corrupted formula in detachment at {position}: {detail}")]
    Corrupted { position: usize, detail: String },
}

/// Condensed detachment over a fixed set of axioms.
///
/// `D x y` requires the conclusion of `x` to be an implication `C a b` and
/// yields `b σ`, where σ is the most general unifier of `a` and the
/// conclusion of `y` (renamed apart). Conclusions are normalized.
#[derive(Debug)]
pub struct CondensedDetachment {
    symbols: Arc<SymbolTable>,
    implication: OperatorSymbol,
    axioms: Vec<Formula>,
}

/// Łukasiewicz's axioms for classical implication and negation
pub const LUKASIEWICZ_AXIOMS: [&str; 3] = ["CpCqp", "CCpCqrCCpqCpr", "CCNpNqCqp"];

impl CondensedDetachment {
    /// Create an evaluator. Axioms are referred to as `1`..`9`, so at most
    /// nine are allowed.
    pub fn new(symbols: Arc<SymbolTable>, axioms: Vec<Formula>) -> Result<Self> {
        let implication = symbols
            .implication()
            .ok_or_else(|| Error::Config("implication operator is not registered".to_string()))?;
        if axioms.is_empty() || axioms.len() > 9 {
            return Err(Error::Config(format!(
                "between 1 and 9 axioms are supported, got {}",
                axioms.len()
            )));
        }
        let axioms = axioms.iter().map(Formula::normalized).collect();
        Ok(CondensedDetachment {
            symbols,
            implication,
            axioms,
        })
    }

    /// Create an evaluator from axioms in Polish notation, e.g. `CpCqp`
    pub fn from_polish(symbols: Arc<SymbolTable>, axioms: &[&str]) -> Result<Self> {
        let formulas = axioms
            .iter()
            .map(|text| Formula::parse_polish(text, &symbols))
            .collect::<Result<Vec<_>>>()?;
        CondensedDetachment::new(symbols, formulas)
    }

    /// The Łukasiewicz calculus `CpCqp`, `CCpCqrCCpqCpr`, `CCNpNqCqp`
    pub fn lukasiewicz(symbols: Arc<SymbolTable>) -> Result<Self> {
        CondensedDetachment::from_polish(symbols, &LUKASIEWICZ_AXIOMS)
    }

    pub fn axioms(&self) -> &[Formula] {
        &self.axioms
    }

    /// One detachment step: from `C a b` (major) and `minor` infer `b σ`.
    pub fn detach(
        &self,
        major: &Formula,
        minor: &Formula,
        position: usize,
    ) -> std::result::Result<Formula, ParseFailure> {
        let (antecedent, consequent) = match major.node() {
            Node::Operator(symbol, children) if symbol.id == self.implication.id => {
                match children.as_slice() {
                    [a, b] => (a, b),
                    _ => {
                        return Err(ParseFailure::Corrupted {
                            position,
                            detail: format!("implication with {} operands", children.len()),
                        })
                    }
                }
            }
            _ => return Err(ParseFailure::NotAnImplication(position)),
        };

        let offset = major.max_variable().map_or(0, |v| v.as_u32() + 1);
        let minor = minor.shift_variables(offset);
        let sigma = try_unify_trees(antecedent, &minor).map_err(|e| {
            if e.is_corruption() {
                ParseFailure::Corrupted {
                    position,
                    detail: e.to_string(),
                }
            } else {
                ParseFailure::NotUnifiable(position)
            }
        })?;
        Ok(consequent.substitute(&sigma).normalized())
    }
}

impl ProofParser for CondensedDetachment {
    /// Evaluate right to left on an explicit stack: digits push axioms, `D`
    /// pops its major and then its minor premise.
    fn parse(&self, proof: &str) -> std::result::Result<Formula, ParseFailure> {
        if proof.is_empty() {
            return Err(ParseFailure::Empty);
        }
        let mut stack: Vec<Formula> = Vec::with_capacity(proof.len() / 2 + 1);
        for (position, ch) in proof.char_indices().rev() {
            match ch {
                'D' => {
                    let major = stack.pop().ok_or(ParseFailure::MissingPremise(position))?;
                    let minor = stack.pop().ok_or(ParseFailure::MissingPremise(position))?;
                    stack.push(self.detach(&major, &minor, position)?);
                }
                '1'..='9' => {
                    let index = ch as usize - '1' as usize;
                    let axiom = self
                        .axioms
                        .get(index)
                        .ok_or(ParseFailure::UnexpectedCharacter { ch, position })?;
                    stack.push(axiom.clone());
                }
                _ => return Err(ParseFailure::UnexpectedCharacter { ch, position }),
            }
        }
        let conclusion = stack.pop().ok_or(ParseFailure::Empty)?;
        if !stack.is_empty() {
            let leftover = stack.len() + 1;
            debug!(proof, leftover, "proof string does not reduce to one conclusion");
            return Err(ParseFailure::DanglingPremises(leftover));
        }
        Ok(conclusion)
    }

    fn axiom_proofs(&self) -> Vec<String> {
        (1..=self.axioms.len()).map(|i| i.to_string()).collect()
    }

    fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CondensedDetachment {
        CondensedDetachment::lukasiewicz(Arc::new(SymbolTable::classical())).unwrap()
    }

    fn conclusion(parser: &CondensedDetachment, proof: &str) -> String {
        parser.parse(proof).unwrap().key(parser.symbols())
    }

    #[test]
    fn test_axioms() {
        let p = parser();
        assert_eq!(conclusion(&p, "1"), "C0C1.0");
        assert_eq!(conclusion(&p, "2"), "CC0C1.2CC0.1C0.2");
        assert_eq!(conclusion(&p, "3"), "CCN0N1C1.0");
        assert_eq!(p.axiom_proofs(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_self_implication() {
        let p = parser();
        // D21 proves C(C(p,q), C(p,p)); detaching axiom 1 gives p→p
        assert_eq!(conclusion(&p, "D21"), "CC0.1C0.0");
        assert_eq!(conclusion(&p, "DD211"), "C0.0");
    }

    #[test]
    fn test_length_three_conclusions() {
        let p = parser();
        assert_eq!(conclusion(&p, "D11"), "C0C1C2.1");
        // Axiom 3's antecedent needs a negated implication
        assert!(matches!(p.parse("D31"), Err(ParseFailure::NotUnifiable(0))));
    }

    #[test]
    fn test_malformed_proofs() {
        let p = parser();
        assert_eq!(p.parse(""), Err(ParseFailure::Empty));
        assert_eq!(p.parse("D1"), Err(ParseFailure::MissingPremise(0)));
        assert_eq!(p.parse("11"), Err(ParseFailure::DanglingPremises(2)));
        assert_eq!(
            p.parse("D14"),
            Err(ParseFailure::UnexpectedCharacter { ch: '4', position: 2 })
        );
        assert_eq!(
            p.parse("Dx1"),
            Err(ParseFailure::UnexpectedCharacter { ch: 'x', position: 1 })
        );
    }

    #[test]
    fn test_rejects_bad_axiom_sets() {
        let symbols = Arc::new(SymbolTable::classical());
        assert!(CondensedDetachment::new(symbols.clone(), vec![]).is_err());
        assert!(CondensedDetachment::new(Arc::new(SymbolTable::new()), vec![Formula::var(0)]).is_err());
        assert!(CondensedDetachment::from_polish(symbols, &["CpX"]).is_err());
    }
}
