//! Length-by-length generation of representative proofs
//!
//! Each step enumerates every candidate of the next odd length from the
//! representatives found so far, evaluates it, keeps the best proof per new
//! conclusion and finally removes the conclusions that are instances of a
//! known schema.

pub mod balancer;
pub mod enumerate;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::filter::{find_redundant, remove_redundant, RedundancyCheck};
use crate::proof::{prefers, ProofParser, ProofStore, Representative, Representatives};
use crate::stats::GenerationStats;
use crate::Result;

pub use balancer::{enumerate_parallel, BalanceReport, ParallelSink};
pub use enumerate::{collect_candidates, enumerate_candidates};

/// Drives generation for one proof calculus
pub struct Generator<P: ProofParser> {
    parser: P,
    config: GeneratorConfig,
    representatives: Representatives,
    /// Longest proof length generated so far
    completed: usize,
    store: Option<ProofStore>,
}

/// Per-length state shared by the candidate workers
struct CandidateSink<'a, P> {
    parser: &'a P,
    known: &'a Representatives,
    fresh: DashMap<String, Representative>,
    parse_failures: AtomicU64,
    duplicates: AtomicU64,
}

impl<P: ProofParser> CandidateSink<'_, P> {
    fn handle(&self, proof: &str) {
        let conclusion = match self.parser.parse(proof) {
            Ok(conclusion) => conclusion,
            Err(_) => {
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let key = conclusion.key(self.parser.symbols());
        if self.known.contains(&key) {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.fresh.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Representative {
                    proof: proof.to_string(),
                    conclusion,
                });
            }
            Entry::Occupied(mut slot) => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                if prefers(proof, &slot.get().proof) {
                    slot.insert(Representative {
                        proof: proof.to_string(),
                        conclusion,
                    });
                }
            }
        }
    }
}

impl<P: ProofParser> Generator<P> {
    /// Start from the axioms alone
    pub fn new(parser: P, config: GeneratorConfig) -> Self {
        let mut representatives = Representatives::new();
        for proof in parser.axiom_proofs() {
            if let Ok(conclusion) = parser.parse(&proof) {
                let key = conclusion.key(parser.symbols());
                representatives.offer(key, proof, conclusion);
            }
        }
        Generator {
            parser,
            config,
            representatives,
            completed: 1,
            store: None,
        }
    }

    /// Resume from the collections in `config.data_dir`, saving every
    /// generated length there. An empty directory starts from the axioms.
    pub fn from_store(parser: P, config: GeneratorConfig) -> Result<Self> {
        let store = ProofStore::new(config.data_dir.clone());
        let lengths = store.filtered_lengths();
        let mut generator = match lengths.last() {
            Some(&completed) => {
                let representatives = store.load(&parser, None)?;
                info!(
                    dir = %store.dir().display(),
                    completed,
                    representatives = representatives.len(),
                    "resuming from stored proofs"
                );
                Generator {
                    parser,
                    config,
                    representatives,
                    completed,
                    store: None,
                }
            }
            None => {
                let generator = Generator::new(parser, config);
                store.save_length(&generator.representatives, 1, true)?;
                generator
            }
        };
        generator.store = Some(store);
        Ok(generator)
    }

    pub fn representatives(&self) -> &Representatives {
        &self.representatives
    }

    pub fn into_representatives(self) -> Representatives {
        self.representatives
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Length the next call to `generate_next` produces
    pub fn next_length(&self) -> usize {
        self.completed + 2
    }

    /// Generate the representatives of the next length
    pub fn generate_next(&mut self) -> Result<GenerationStats> {
        let start = Instant::now();
        let length = self.next_length();
        let pools = self.representatives.pools();
        info!(length, known = self.representatives.len(), "generating candidates");

        let sink = CandidateSink {
            parser: &self.parser,
            known: &self.representatives,
            fresh: DashMap::new(),
            parse_failures: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        };
        let report = if self.config.threads > 1 {
            enumerate_parallel(
                &pools,
                length,
                self.config.threads,
                self.config.low_water_mark,
                |_, proof| sink.handle(proof),
            )
        } else {
            BalanceReport {
                candidates: enumerate_candidates(&pools, length, |proof| sink.handle(proof)),
                ..Default::default()
            }
        };
        let enumerate_time = start.elapsed();

        let mut stats = GenerationStats {
            length,
            candidates: report.candidates,
            parse_failures: sink.parse_failures.load(Ordering::Relaxed),
            duplicate_conclusions: sink.duplicates.load(Ordering::Relaxed),
            moved_batches: report.moved_batches,
            moved_proofs: report.moved_proofs,
            enumerate_time,
            ..Default::default()
        };

        let mut fresh: Vec<(String, Representative)> = sink.fresh.into_iter().collect();
        fresh.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        stats.accepted = fresh.len();
        for (key, rep) in fresh {
            self.representatives.offer(key, rep.proof, rep.conclusion);
        }
        debug!(
            length,
            candidates = stats.candidates,
            parse_failures = stats.parse_failures,
            duplicates = stats.duplicate_conclusions,
            accepted = stats.accepted,
            "candidates evaluated"
        );

        if let Some(store) = &self.store {
            store.save_length(&self.representatives, length, false)?;
        }

        if self.config.redundancy_filter {
            let filter_start = Instant::now();
            let check = RedundancyCheck::new(&self.representatives, length);
            let redundant = find_redundant(&check)?;
            let keys = check.candidate_keys(&redundant);
            stats.redundant = remove_redundant(&mut self.representatives, &keys);
            stats.filter_time = filter_start.elapsed();
        }

        if let Some(store) = &self.store {
            store.save_length(&self.representatives, length, true)?;
        }

        self.completed = length;
        stats.representatives = self.representatives.len();
        stats.total_time = start.elapsed();
        info!(
            length,
            kept = stats.kept(),
            redundant = stats.redundant,
            representatives = stats.representatives,
            elapsed = ?stats.total_time,
            "length complete"
        );
        Ok(stats)
    }

    /// Generate every length up to and including `max_length`
    pub fn generate_up_to(&mut self, max_length: usize) -> Result<Vec<GenerationStats>> {
        let mut all = Vec::new();
        while self.next_length() <= max_length {
            all.push(self.generate_next()?);
        }
        Ok(all)
    }
}
