//! Thread-deque load balancing for candidate processing
//!
//! The enumerating thread pushes every completed proof string into one of
//! `T` worker deques, preferring the first empty deque and otherwise the
//! least loaded one. Each worker drains its own deque. A balancing thread
//! sleeps on a condition variable that workers signal when their deque drops
//! below the low-water mark; on wakeup it moves half of the tail of the
//! fullest deque into the most starved one.
//!
//! Balancing ends once production has finished and every deque is below the
//! mark at the same time. Workers then drain what is left in their own deque
//! and exit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use super::enumerate::enumerate_candidates;
use crate::proof::ProofPools;

/// Upper bound on how long the balancer sleeps without a signal
const BALANCE_INTERVAL: Duration = Duration::from_millis(10);

/// An idle worker signals the balancer every this many empty polls
const IDLE_SIGNAL_PERIOD: u32 = 64;

/// Counters from one parallel enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceReport {
    pub candidates: u64,
    pub moved_batches: u64,
    pub moved_proofs: u64,
}

struct WorkerDeque {
    items: Mutex<VecDeque<String>>,
    /// Mirrors `items.len()` so deques can be compared without locking
    size: AtomicUsize,
}

impl WorkerDeque {
    fn new() -> Self {
        WorkerDeque {
            items: Mutex::new(VecDeque::new()),
            size: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }
}

/// Producer side of the worker deques, handed to the enumerator
pub struct ParallelSink {
    deques: Vec<WorkerDeque>,
    low_water_mark: usize,
    production_done: AtomicBool,
    balancing_done: AtomicBool,
    signal: Mutex<()>,
    wake: Condvar,
    moved_batches: AtomicU64,
    moved_proofs: AtomicU64,
}

impl ParallelSink {
    fn new(threads: usize, low_water_mark: usize) -> Self {
        ParallelSink {
            deques: (0..threads.max(1)).map(|_| WorkerDeque::new()).collect(),
            low_water_mark: low_water_mark.max(1),
            production_done: AtomicBool::new(false),
            balancing_done: AtomicBool::new(false),
            signal: Mutex::new(()),
            wake: Condvar::new(),
            moved_batches: AtomicU64::new(0),
            moved_proofs: AtomicU64::new(0),
        }
    }

    /// Hand one proof to the first empty deque, else to the least loaded
    pub fn push(&self, proof: &str) {
        let target = self
            .deques
            .iter()
            .position(|d| d.len() == 0)
            .or_else(|| {
                self.deques
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, d)| d.len())
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);
        let deque = &self.deques[target];
        let mut items = deque.lock();
        items.push_back(proof.to_string());
        deque.size.store(items.len(), Ordering::Release);
    }

    fn pop(&self, worker: usize) -> Option<String> {
        let deque = &self.deques[worker];
        let mut items = deque.lock();
        let proof = items.pop_front()?;
        let remaining = items.len();
        deque.size.store(remaining, Ordering::Release);
        drop(items);
        if remaining + 1 == self.low_water_mark {
            self.notify();
        }
        Some(proof)
    }

    fn notify(&self) {
        let _guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_one();
    }

    fn finish_production(&self) {
        self.production_done.store(true, Ordering::Release);
        self.notify();
    }

    fn all_starved(&self) -> bool {
        self.deques.iter().all(|d| d.len() < self.low_water_mark)
    }

    fn worker_loop<W: Fn(usize, &str)>(&self, index: usize, work: &W) {
        let mut idle_polls = 0u32;
        loop {
            // Read before popping: once set, no proof can arrive later
            let done = self.balancing_done.load(Ordering::Acquire);
            if let Some(proof) = self.pop(index) {
                idle_polls = 0;
                work(index, &proof);
                continue;
            }
            if done {
                trace!(worker = index, "worker drained");
                return;
            }
            idle_polls += 1;
            if idle_polls % IDLE_SIGNAL_PERIOD == 0 {
                self.notify();
            }
            thread::yield_now();
        }
    }

    fn balance_loop(&self) {
        loop {
            {
                let guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = self
                    .wake
                    .wait_timeout(guard, BALANCE_INTERVAL)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if self.production_done.load(Ordering::Acquire) && self.all_starved() {
                self.balancing_done.store(true, Ordering::Release);
                return;
            }
            self.rebalance();
        }
    }

    /// Move half of the fullest deque's tail into the most starved deque
    fn rebalance(&self) {
        let Some((starved, starved_len)) = self
            .deques
            .iter()
            .enumerate()
            .map(|(i, d)| (i, d.len()))
            .min_by_key(|&(_, len)| len)
        else {
            return;
        };
        let Some((full, full_len)) = self
            .deques
            .iter()
            .enumerate()
            .map(|(i, d)| (i, d.len()))
            .max_by_key(|&(_, len)| len)
        else {
            return;
        };
        if starved == full || starved_len >= self.low_water_mark || full_len <= self.low_water_mark
        {
            return;
        }

        // Lock in index order
        let (first, second) = if starved < full {
            (starved, full)
        } else {
            (full, starved)
        };
        let mut lo = self.deques[first].lock();
        let mut hi = self.deques[second].lock();
        let (source, sink) = if starved < full {
            (&mut *hi, &mut *lo)
        } else {
            (&mut *lo, &mut *hi)
        };
        let moved = source.len() / 2;
        if moved == 0 {
            return;
        }
        let tail = source.split_off(source.len() - moved);
        sink.extend(tail);
        self.deques[full].size.store(source.len(), Ordering::Release);
        self.deques[starved].size.store(sink.len(), Ordering::Release);
        drop(lo);
        drop(hi);

        self.moved_batches.fetch_add(1, Ordering::Relaxed);
        self.moved_proofs.fetch_add(moved as u64, Ordering::Relaxed);
        debug!(from = full, to = starved, moved, "rebalanced worker deques");
    }
}

/// Enumerate the candidates of length `target` on the calling thread while
/// `threads` workers process them through `work(worker_index, proof)`.
///
/// Every candidate is processed exactly once. Returns after all workers have
/// finished.
pub fn enumerate_parallel<W>(
    pools: &ProofPools,
    target: usize,
    threads: usize,
    low_water_mark: usize,
    work: W,
) -> BalanceReport
where
    W: Fn(usize, &str) + Sync,
{
    let sink = ParallelSink::new(threads, low_water_mark);
    let candidates = thread::scope(|scope| {
        for index in 0..sink.deques.len() {
            let sink = &sink;
            let work = &work;
            scope.spawn(move || sink.worker_loop(index, work));
        }
        scope.spawn(|| sink.balance_loop());

        let candidates = enumerate_candidates(pools, target, |proof| sink.push(proof));
        sink.finish_production();
        candidates
    });

    let report = BalanceReport {
        candidates,
        moved_batches: sink.moved_batches.load(Ordering::Relaxed),
        moved_proofs: sink.moved_proofs.load(Ordering::Relaxed),
    };
    debug!(
        target,
        threads = sink.deques.len(),
        candidates = report.candidates,
        moved_batches = report.moved_batches,
        "parallel enumeration finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::enumerate::collect_candidates;
    use std::collections::BTreeMap;

    fn pools() -> ProofPools {
        ["1", "2", "3", "D11", "D12", "D21", "D22", "D31", "D13"]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_every_candidate_processed_once() {
        for threads in [1, 2, 4] {
            let seen: Mutex<BTreeMap<String, usize>> = Mutex::new(BTreeMap::new());
            let report = enumerate_parallel(&pools(), 5, threads, 2, |_, proof| {
                *seen.lock().unwrap().entry(proof.to_string()).or_default() += 1;
            });
            let seen = seen.into_inner().unwrap();
            let expected = collect_candidates(&pools(), 5);
            assert_eq!(report.candidates, expected.len() as u64);
            assert_eq!(seen.len(), expected.len());
            assert!(seen.values().all(|&n| n == 1));
            for proof in expected {
                assert!(seen.contains_key(&proof));
            }
        }
    }

    #[test]
    fn test_slow_worker_gets_relieved() {
        // Worker 0 is slow; its backlog must still be processed by someone
        let count = AtomicU64::new(0);
        let report = enumerate_parallel(&pools(), 5, 3, 1, |worker, _| {
            if worker == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            count.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), report.candidates);
    }

    #[test]
    fn test_nothing_to_enumerate() {
        let report = enumerate_parallel(&ProofPools::new(), 5, 3, 4, |_, _| {
            panic!("no candidates expected")
        });
        assert_eq!(report, BalanceReport::default());
    }
}
