//! Propositional formulas and their canonical keys
//!
//! A `Formula` is an immutable tree whose nodes are shared through `Arc`.
//! Cloning is cheap and equality compares structure, short-circuiting on
//! nodes that are physically shared.
//!
//! The canonical key of a formula is its Polish notation with operator names
//! from the `SymbolTable` and variables written as decimal numbers. A `.`
//! separates a variable from a directly preceding variable:
//!
//! ```text
//! C p C q p    ->  C0C1.0
//! C C N p N q C q p  ->  CCN0N1C1.0
//! ```
//!
//! Keys are injective on normalized formulas, where variables are numbered
//! `0, 1, 2, …` in order of first occurrence.

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::symbols::{OperatorSymbol, SymbolTable, VariableId};
use crate::{Error, Result};

/// A formula node
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Variable(VariableId),
    Operator(OperatorSymbol, Vec<Formula>),
}

/// Shared, immutable formula tree
#[derive(Clone)]
pub struct Formula(Arc<Node>);

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for Formula {}

impl Hash for Formula {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Formula {
    /// A variable leaf
    pub fn variable(id: VariableId) -> Self {
        Formula(Arc::new(Node::Variable(id)))
    }

    /// Shorthand for `Formula::variable(VariableId::new(id))`
    pub fn var(id: u32) -> Self {
        Formula::variable(VariableId::new(id))
    }

    /// An operator node; the number of children must equal the arity.
    pub fn operator(symbol: OperatorSymbol, children: Vec<Formula>) -> Result<Self> {
        if children.len() != symbol.arity as usize {
            return Err(Error::CorruptedFormula(format!(
                "operator #{} has arity {} but {} children were supplied",
                symbol.id.as_u32(),
                symbol.arity,
                children.len()
            )));
        }
        Ok(Formula(Arc::new(Node::Operator(symbol, children))))
    }

    /// Rebuild a node whose children were taken from an existing node of the
    /// same symbol, so the arity is already known to match.
    pub(crate) fn rebuild(symbol: OperatorSymbol, children: Vec<Formula>) -> Self {
        debug_assert_eq!(children.len(), symbol.arity as usize);
        Formula(Arc::new(Node::Operator(symbol, children)))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub fn as_variable(&self) -> Option<VariableId> {
        match *self.0 {
            Node::Variable(v) => Some(v),
            Node::Operator(..) => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.as_variable().is_some()
    }

    pub fn symbol(&self) -> Option<OperatorSymbol> {
        match *self.0 {
            Node::Variable(_) => None,
            Node::Operator(symbol, _) => Some(symbol),
        }
    }

    pub fn children(&self) -> &[Formula] {
        match &*self.0 {
            Node::Variable(_) => &[],
            Node::Operator(_, children) => children,
        }
    }

    /// True when both handles point at the same node
    pub fn ptr_eq(&self, other: &Formula) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Check whether `var` occurs anywhere in this formula
    pub fn contains_variable(&self, var: VariableId) -> bool {
        match &*self.0 {
            Node::Variable(v) => *v == var,
            Node::Operator(_, children) => children.iter().any(|c| c.contains_variable(var)),
        }
    }

    /// Distinct variables in order of first occurrence
    pub fn variable_ids(&self) -> Vec<VariableId> {
        let mut seen = Vec::new();
        self.collect_variables(&mut seen);
        seen
    }

    fn collect_variables(&self, seen: &mut Vec<VariableId>) {
        match &*self.0 {
            Node::Variable(v) => {
                if !seen.contains(v) {
                    seen.push(*v);
                }
            }
            Node::Operator(_, children) => {
                for child in children {
                    child.collect_variables(seen);
                }
            }
        }
    }

    /// Largest variable ID occurring in the formula
    pub fn max_variable(&self) -> Option<VariableId> {
        match &*self.0 {
            Node::Variable(v) => Some(*v),
            Node::Operator(_, children) => children.iter().filter_map(|c| c.max_variable()).max(),
        }
    }

    /// Number of nodes
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }

    /// Length of the formula in standard infix notation, counting every
    /// variable as one symbol: binary operators contribute the connective and
    /// a pair of parentheses, unary and nullary operators one symbol.
    ///
    /// Substituting formulas for variables never decreases this value, so a
    /// schema is never longer than any of its instances.
    pub fn standard_length(&self) -> usize {
        match &*self.0 {
            Node::Variable(_) => 1,
            Node::Operator(symbol, children) => {
                let own = if symbol.arity == 2 { 3 } else { 1 };
                own + children.iter().map(|c| c.standard_length()).sum::<usize>()
            }
        }
    }

    /// Rename every variable through `rename`
    pub fn rename_variables(&self, rename: &mut impl FnMut(VariableId) -> VariableId) -> Formula {
        match &*self.0 {
            Node::Variable(v) => Formula::variable(rename(*v)),
            Node::Operator(symbol, children) => {
                let children = children.iter().map(|c| c.rename_variables(rename)).collect();
                Formula::rebuild(*symbol, children)
            }
        }
    }

    /// Add `offset` to every variable ID, e.g. to rename two premises apart
    pub fn shift_variables(&self, offset: u32) -> Formula {
        if offset == 0 {
            return self.clone();
        }
        self.rename_variables(&mut |v| VariableId(v.0 + offset))
    }

    /// True when variables are numbered `0, 1, 2, …` by first occurrence
    pub fn is_normalized(&self) -> bool {
        self.variable_ids()
            .iter()
            .enumerate()
            .all(|(i, v)| v.0 as usize == i)
    }

    /// Renumber variables `0, 1, 2, …` in order of first occurrence
    pub fn normalized(&self) -> Formula {
        if self.is_normalized() {
            return self.clone();
        }
        let mut mapping: HashMap<VariableId, VariableId> = HashMap::new();
        self.rename_variables(&mut |v| {
            let next = VariableId(mapping.len() as u32);
            *mapping.entry(v).or_insert(next)
        })
    }

    /// Format this formula as its key, resolving operator names in `symbols`
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> FormulaDisplay<'a> {
        FormulaDisplay {
            formula: self,
            symbols,
        }
    }

    /// Canonical conclusion key (the formula should be normalized)
    pub fn key(&self, symbols: &SymbolTable) -> String {
        self.display(symbols).to_string()
    }

    /// Parse a canonical key back into a formula
    pub fn from_key(key: &str, symbols: &SymbolTable) -> Result<Formula> {
        let tokens = tokenize_key(key, symbols)?;
        build_polish(tokens, key)
    }

    /// Parse Polish notation with lowercase letters as variables, e.g.
    /// `CpCqp`. Variables are numbered by first occurrence, so the result is
    /// normalized.
    pub fn parse_polish(text: &str, symbols: &SymbolTable) -> Result<Formula> {
        let view = symbols.read();
        let mut names: HashMap<char, u32> = HashMap::new();
        let mut tokens = Vec::with_capacity(text.len());
        for ch in text.chars().filter(|c| !c.is_whitespace()) {
            if ch.is_ascii_lowercase() {
                let next = names.len() as u32;
                tokens.push(Token::Variable(VariableId(*names.entry(ch).or_insert(next))));
            } else if let Some(symbol) = view.get(ch) {
                tokens.push(Token::Operator(symbol));
            } else {
                return Err(Error::Parse(format!(
                    "unknown symbol {:?} in formula {:?}",
                    ch, text
                )));
            }
        }
        drop(view);
        build_polish(tokens, text)
    }
}

enum Token {
    Variable(VariableId),
    Operator(OperatorSymbol),
}

fn tokenize_key(key: &str, symbols: &SymbolTable) -> Result<Vec<Token>> {
    let view = symbols.read();
    let bytes = key.as_bytes();
    let mut tokens = Vec::with_capacity(bytes.len());
    let mut previous_variable = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'.' || b.is_ascii_digit() {
            let separated = b == b'.';
            if separated {
                if !previous_variable {
                    return Err(Error::Parse(format!(
                        "separator without preceding variable at {} in key {:?}",
                        i, key
                    )));
                }
                i += 1;
            } else if previous_variable {
                return Err(Error::Parse(format!(
                    "missing separator between variables at {} in key {:?}",
                    i, key
                )));
            }
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let digits = &key[start..i];
            if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
                return Err(Error::Parse(format!(
                    "malformed variable {:?} in key {:?}",
                    digits, key
                )));
            }
            let id: u32 = digits
                .parse()
                .map_err(|e| Error::Parse(format!("variable {:?} in key {:?}: {}", digits, key, e)))?;
            tokens.push(Token::Variable(VariableId(id)));
            previous_variable = true;
        } else {
            let ch = b as char;
            let symbol = view.get(ch).ok_or_else(|| {
                Error::Parse(format!("unknown operator {:?} in key {:?}", ch, key))
            })?;
            tokens.push(Token::Operator(symbol));
            previous_variable = false;
            i += 1;
        }
    }
    Ok(tokens)
}

/// Assemble a prefix-notation token stream right to left on an explicit stack.
fn build_polish(tokens: Vec<Token>, source: &str) -> Result<Formula> {
    let mut stack: Vec<Formula> = Vec::new();
    for token in tokens.into_iter().rev() {
        match token {
            Token::Variable(v) => stack.push(Formula::variable(v)),
            Token::Operator(symbol) => {
                let arity = symbol.arity as usize;
                if stack.len() < arity {
                    return Err(Error::Parse(format!(
                        "operator is missing operands in {:?}",
                        source
                    )));
                }
                let children: Vec<Formula> = (0..arity).filter_map(|_| stack.pop()).collect();
                stack.push(Formula::operator(symbol, children)?);
            }
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(formula), true) => Ok(formula),
        (None, _) => Err(Error::Parse("empty formula".to_string())),
        (Some(_), false) => Err(Error::Parse(format!(
            "{} unconsumed operands in {:?}",
            stack.len(),
            source
        ))),
    }
}

/// Display wrapper writing the canonical key of a formula
pub struct FormulaDisplay<'a> {
    formula: &'a Formula,
    symbols: &'a SymbolTable,
}

impl fmt::Display for FormulaDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.symbols.read();
        let mut stack = vec![self.formula];
        let mut previous_variable = false;
        while let Some(formula) = stack.pop() {
            match formula.node() {
                Node::Variable(v) => {
                    if previous_variable {
                        f.write_char('.')?;
                    }
                    write!(f, "{}", v)?;
                    previous_variable = true;
                }
                Node::Operator(symbol, children) => {
                    f.write_char(view.name(symbol.id))?;
                    previous_variable = false;
                    stack.extend(children.iter().rev());
                }
            }
        }
        Ok(())
    }
}

// Display without a symbol table shows raw operator IDs (for debugging)

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Variable(v) => write!(f, "V{}", v),
            Node::Operator(symbol, children) => {
                write!(f, "O{}", symbol.id.as_u32())?;
                if !children.is_empty() {
                    write!(f, "(")?;
                    for (i, child) in children.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", child)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polish(text: &str, symbols: &SymbolTable) -> Formula {
        Formula::parse_polish(text, symbols).unwrap()
    }

    #[test]
    fn test_key_of_axioms() {
        let symbols = SymbolTable::classical();
        assert_eq!(polish("CpCqp", &symbols).key(&symbols), "C0C1.0");
        assert_eq!(
            polish("CCpCqrCCpqCpr", &symbols).key(&symbols),
            "CC0C1.2CC0.1C0.2"
        );
        assert_eq!(polish("CCNpNqCqp", &symbols).key(&symbols), "CCN0N1C1.0");
    }

    #[test]
    fn test_key_roundtrip_large_variables() {
        let symbols = SymbolTable::classical();
        let imp = symbols.implication().unwrap();
        let f = Formula::operator(imp, vec![Formula::var(10), Formula::var(11)]).unwrap();
        let key = f.key(&symbols);
        assert_eq!(key, "C10.11");
        assert_eq!(Formula::from_key(&key, &symbols).unwrap(), f);
    }

    #[test]
    fn test_from_key_rejects_malformed() {
        let symbols = SymbolTable::classical();
        assert!(Formula::from_key("", &symbols).is_err());
        assert!(Formula::from_key("C0", &symbols).is_err());
        assert!(Formula::from_key("C0.1.2", &symbols).is_err());
        assert!(Formula::from_key("C.01", &symbols).is_err());
        assert!(Formula::from_key("C01", &symbols).is_err());
        assert!(Formula::from_key("X0", &symbols).is_err());
    }

    #[test]
    fn test_arity_checked_on_construction() {
        let symbols = SymbolTable::classical();
        let imp = symbols.implication().unwrap();
        let result = Formula::operator(imp, vec![Formula::var(0)]);
        assert!(matches!(result, Err(Error::CorruptedFormula(_))));
    }

    #[test]
    fn test_normalization() {
        let symbols = SymbolTable::classical();
        let imp = symbols.implication().unwrap();
        let f = Formula::operator(
            imp,
            vec![
                Formula::var(7),
                Formula::operator(imp, vec![Formula::var(3), Formula::var(7)]).unwrap(),
            ],
        )
        .unwrap();
        assert!(!f.is_normalized());
        let n = f.normalized();
        assert!(n.is_normalized());
        assert_eq!(n.key(&symbols), "C0C1.0");
    }

    #[test]
    fn test_standard_length_and_size() {
        let symbols = SymbolTable::classical();
        // (p→(q→p))
        let f = polish("CpCqp", &symbols);
        assert_eq!(f.standard_length(), 9);
        assert_eq!(f.size(), 5);
        // ¬p
        assert_eq!(polish("Np", &symbols).standard_length(), 2);
    }

    #[test]
    fn test_equality_uses_structure_and_identity() {
        let symbols = SymbolTable::classical();
        let a = polish("CpCqp", &symbols);
        let b = polish("CpCqp", &symbols);
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        let c = a.clone();
        assert!(a.ptr_eq(&c));
        assert_ne!(a, polish("CqCpp", &symbols));
    }

    #[test]
    fn test_shift_and_variables() {
        let symbols = SymbolTable::classical();
        let f = polish("CpCqp", &symbols);
        let shifted = f.shift_variables(5);
        assert_eq!(
            shifted.variable_ids(),
            vec![VariableId::new(5), VariableId::new(6)]
        );
        assert_eq!(shifted.max_variable(), Some(VariableId::new(6)));
        assert!(shifted.contains_variable(VariableId::new(5)));
        assert!(!shifted.contains_variable(VariableId::new(0)));
    }
}
