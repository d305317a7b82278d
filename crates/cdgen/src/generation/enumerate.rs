//! Exact-length enumeration of condensed-detachment proof strings
//!
//! Candidates of length `L` are the words of length `L` of the grammar
//!
//! ```text
//! S → P1 | P3 | … | Pk | D A A
//! A → P1 | P3 | … | Pk
//! ```
//!
//! where `Pn` stands for any known proof of length `n`. The walk is a
//! depth-first traversal of the pushdown automaton for this grammar: the
//! stack holds the nonterminals still to expand, and a branch is cut as soon
//! as the committed prefix plus one symbol per pending nonterminal exceeds
//! `L`. The last nonterminal only takes proofs of exactly the remaining
//! length, so every completed word has length `L` and is reached once.

use crate::proof::ProofPools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nonterminal {
    Start,
    Argument,
}

struct Enumerator<'a, F> {
    pools: &'a ProofPools,
    target: usize,
    prefix: String,
    stack: Vec<Nonterminal>,
    sink: F,
    emitted: u64,
}

impl<F: FnMut(&str)> Enumerator<'_, F> {
    fn expand(&mut self) {
        let Some(top) = self.stack.pop() else {
            if self.prefix.len() == self.target {
                (self.sink)(&self.prefix);
                self.emitted += 1;
            }
            return;
        };

        let remaining = self.target - self.prefix.len();
        if self.stack.is_empty() {
            let pools = self.pools;
            for proof in pools.pool(remaining) {
                self.commit(proof);
            }
        } else {
            let budget = remaining - self.stack.len();
            let pools = self.pools;
            for (_, pool) in pools.up_to(budget) {
                for proof in pool {
                    self.commit(proof);
                }
            }
        }

        // D plus one symbol for each argument plus one per pending nonterminal
        if top == Nonterminal::Start && self.prefix.len() + 3 + self.stack.len() <= self.target {
            self.prefix.push('D');
            self.stack.push(Nonterminal::Argument);
            self.stack.push(Nonterminal::Argument);
            self.expand();
            self.stack.truncate(self.stack.len() - 2);
            self.prefix.pop();
        }

        self.stack.push(top);
    }

    fn commit(&mut self, proof: &str) {
        let mark = self.prefix.len();
        self.prefix.push_str(proof);
        self.expand();
        self.prefix.truncate(mark);
    }
}

/// Feed every proof string of length exactly `target` to `sink`, returning
/// the number emitted.
pub fn enumerate_candidates<F: FnMut(&str)>(pools: &ProofPools, target: usize, sink: F) -> u64 {
    if target == 0 {
        return 0;
    }
    let mut enumerator = Enumerator {
        pools,
        target,
        prefix: String::with_capacity(target),
        stack: vec![Nonterminal::Start],
        sink,
        emitted: 0,
    };
    enumerator.expand();
    enumerator.emitted
}

/// Collect the candidates of length `target` into a vector
pub fn collect_candidates(pools: &ProofPools, target: usize) -> Vec<String> {
    let mut out = Vec::new();
    enumerate_candidates(pools, target, |proof| out.push(proof.to_string()));
    out
}
