//! Work-stealing redundancy filter across ranks
//!
//! The candidate indices `[0, n)` are split into one contiguous share per
//! rank. Each share is divided into an active range, processed by a worker
//! thread, and a reservable range that other ranks may claim. The thread
//! calling [`DistributedFilter::run`] is the rank's only communicator: it
//! polls on a fixed cadence, answers peers, streams findings to rank 0 and
//! drives the rank through its phases:
//!
//! ```text
//! Active ──▶ Requesting ──▶ Reserving ──▶ Active
//!              │    ▲           │
//!              │    └─rejected──┘
//!              ▼
//!      WaitingTermination ──▶ Terminated
//! ```
//!
//! Rank 0 ends the pass once every rank has reported idle and every reported
//! finding has arrived.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, trace};

use super::protocol::{Message, Tag, WorkRange};
use super::transport::Transport;
use crate::config::DistributedConfig;
use crate::stats::FilterStats;
use crate::{Error, Result};

/// Result of one rank's part in a pass
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// All redundant candidate indices in ascending order on rank 0, `None`
    /// on other ranks
    pub redundant: Option<Vec<u64>>,
    pub stats: FilterStats,
}

/// Where a rank stands in the work-stealing protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// The worker is processing an owned range
    Active,
    /// Waiting for the reservable ranges of `awaiting`
    Requesting {
        awaiting: BTreeSet<usize>,
        offers: Vec<(usize, WorkRange)>,
    },
    /// Claimed `range` from `peer`, waiting for the answer
    Reserving { peer: usize, range: WorkRange },
    /// Out of work, reported idle to rank 0
    WaitingTermination,
    Terminated,
}

#[derive(Debug, Default)]
struct Slot {
    active: WorkRange,
    error: Option<Error>,
}

/// State shared by the communicator and the worker thread
struct Handoff {
    slot: Mutex<Slot>,
    /// Set while the worker has no range and waits for one
    loading: AtomicBool,
    /// The worker asks the communicator to act before its next poll
    check_requests: AtomicBool,
    /// The worker has exhausted its last range
    worker_done: AtomicBool,
    shutdown: AtomicBool,
    worker_wake: Condvar,
    comms_wake: Condvar,
    findings: Mutex<Vec<u64>>,
    processed: AtomicU64,
}

impl Handoff {
    fn new(active: WorkRange) -> Self {
        Handoff {
            slot: Mutex::new(Slot {
                active,
                error: None,
            }),
            loading: AtomicBool::new(false),
            check_requests: AtomicBool::new(false),
            worker_done: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            worker_wake: Condvar::new(),
            comms_wake: Condvar::new(),
            findings: Mutex::new(Vec::new()),
            processed: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn work<C>(&self, check: &C)
    where
        C: Fn(u64) -> Result<bool>,
    {
        loop {
            let range = {
                let mut slot = self.lock();
                while self.loading.load(Ordering::Acquire) && !self.shutdown.load(Ordering::Acquire)
                {
                    slot = self
                        .worker_wake
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if self.shutdown.load(Ordering::Acquire) {
                    return;
                }
                std::mem::take(&mut slot.active)
            };

            trace!(first = range.first, end = range.end, "worker starts range");
            for index in range.first..range.end {
                if self.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                match check(index) {
                    Ok(true) => self
                        .findings
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(index),
                    Ok(false) => {}
                    Err(e) => {
                        self.lock().error = Some(e);
                        self.park();
                        return;
                    }
                }
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            self.park();
        }
    }

    /// Mark the worker idle and wake the communicator
    fn park(&self) {
        let _slot = self.lock();
        self.loading.store(true, Ordering::Release);
        self.worker_done.store(true, Ordering::Release);
        self.check_requests.store(true, Ordering::Release);
        self.comms_wake.notify_one();
    }

    /// Give the parked worker a new range
    fn hand(&self, range: WorkRange) {
        let mut slot = self.lock();
        slot.active = range;
        self.worker_done.store(false, Ordering::Release);
        self.loading.store(false, Ordering::Release);
        self.worker_wake.notify_one();
    }

    /// Sleep until the poll interval passes or the worker asks for attention
    fn wait_for_poll(&self, interval: std::time::Duration) -> Option<Error> {
        let slot = self.lock();
        let mut slot = if self.check_requests.swap(false, Ordering::AcqRel) {
            slot
        } else {
            let (slot, _) = self
                .comms_wake
                .wait_timeout(slot, interval)
                .unwrap_or_else(PoisonError::into_inner);
            self.check_requests.store(false, Ordering::Release);
            slot
        };
        slot.error.take()
    }

    fn take_findings(&self) -> Vec<u64> {
        std::mem::take(&mut *self.findings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn stop(&self) {
        let _slot = self.lock();
        self.shutdown.store(true, Ordering::Release);
        self.worker_wake.notify_all();
    }
}

/// Rank 0's view of the global pass
#[derive(Debug)]
struct Ledger {
    redundant: BTreeSet<u64>,
    /// Findings received from each rank
    received: Vec<u64>,
    /// Findings each idle rank claims to have sent
    idle: Vec<Option<u64>>,
}

impl Ledger {
    fn new(size: usize) -> Self {
        Ledger {
            redundant: BTreeSet::new(),
            received: vec![0; size],
            idle: vec![None; size],
        }
    }

    fn complete(&self) -> bool {
        self.idle
            .iter()
            .zip(&self.received)
            .all(|(idle, &received)| *idle == Some(received))
    }
}

/// Communicator state of one rank
struct Comms<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: &'a DistributedConfig,
    rank: usize,
    phase: Phase,
    reservable: WorkRange,
    /// Peers that may still have something to give
    believed_nonempty: BTreeSet<usize>,
    reported: u64,
    ledger: Option<Ledger>,
    stats: FilterStats,
}

impl<T: Transport + ?Sized> Comms<'_, T> {
    fn run(&mut self, handoff: &Handoff) -> Result<()> {
        while self.phase != Phase::Terminated {
            if let Some(e) = handoff.wait_for_poll(self.config.poll_interval) {
                error!(rank = self.rank, "worker failed: {}", e);
                return Err(e);
            }
            self.flush_findings(handoff)?;
            self.serve_peers()?;
            self.collect_reports()?;
            self.step(handoff)?;
            self.watch_peers()?;
        }
        Ok(())
    }

    /// Fail the pass when a peer drops out before it ends.
    ///
    /// Ranks close their connections only once rank 0 has sent `Terminate`,
    /// which happens after every rank went idle. A closed peer is therefore
    /// tolerated only by a non-zero rank that is itself waiting to terminate.
    fn watch_peers(&mut self) -> Result<()> {
        let peers: Vec<usize> = self.peers().collect();
        for peer in peers {
            if self.phase == Phase::Terminated {
                return Ok(());
            }
            if !self.transport.disconnected(peer) {
                continue;
            }
            if peer == 0 {
                // Terminate is queued before the connection is marked closed
                if let Some(Message::Terminate) = self.transport.try_receive(0, Tag::Terminate)? {
                    self.phase = Phase::Terminated;
                    return Ok(());
                }
            } else if self.ledger.is_none() && self.phase == Phase::WaitingTermination {
                continue;
            }
            error!(rank = self.rank, peer, phase = ?self.phase, "peer disconnected during the pass");
            return Err(Error::Transport(format!(
                "rank {} disconnected before the pass ended",
                peer
            )));
        }
        Ok(())
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.transport.size()).filter(move |&p| p != self.rank)
    }

    fn flush_findings(&mut self, handoff: &Handoff) -> Result<()> {
        let findings = handoff.take_findings();
        if findings.is_empty() {
            return Ok(());
        }
        let count = findings.len() as u64;
        match self.ledger.as_mut() {
            Some(ledger) => {
                ledger.received[0] += count;
                ledger.redundant.extend(findings);
            }
            None => {
                for index in findings {
                    self.transport.send(0, Message::RedundantIndex(index))?;
                }
            }
        }
        self.reported += count;
        Ok(())
    }

    /// Answer queries and reservation attempts, whatever the phase
    fn serve_peers(&mut self) -> Result<()> {
        let peers: Vec<usize> = self.peers().collect();
        for peer in peers {
            while let Some(Message::QueryReservable) =
                self.transport.try_receive(peer, Tag::QueryReservable)?
            {
                self.transport
                    .send(peer, Message::ReservableReply(self.reservable))?;
            }
            while let Some(Message::AttemptReservation(range)) =
                self.transport.try_receive(peer, Tag::AttemptReservation)?
            {
                let granted = !range.is_empty() && range == self.reservable;
                if granted {
                    self.reservable = WorkRange::EMPTY;
                    self.stats.given += 1;
                    debug!(rank = self.rank, peer, first = range.first, end = range.end, "range given away");
                }
                self.transport.send(peer, Message::ReservationReply(granted))?;
            }
        }
        Ok(())
    }

    /// Rank 0 gathers findings and idle reports
    fn collect_reports(&mut self) -> Result<()> {
        let Some(ledger) = self.ledger.as_mut() else {
            return Ok(());
        };
        for peer in 1..self.transport.size() {
            while let Some(Message::RedundantIndex(index)) =
                self.transport.try_receive(peer, Tag::RedundantIndex)?
            {
                ledger.received[peer] += 1;
                ledger.redundant.insert(index);
            }
            while let Some(Message::Idle { reported }) = self.transport.try_receive(peer, Tag::Idle)? {
                ledger.idle[peer] = Some(reported);
            }
        }
        Ok(())
    }

    fn step(&mut self, handoff: &Handoff) -> Result<()> {
        match std::mem::replace(&mut self.phase, Phase::Active) {
            Phase::Active => {
                if !handoff.worker_done.load(Ordering::Acquire) {
                    return Ok(());
                }
                if !self.reservable.is_empty() {
                    let range = std::mem::take(&mut self.reservable);
                    self.stats.adopted += 1;
                    self.take_on(range, handoff);
                } else {
                    self.request(handoff)?;
                }
            }
            Phase::Requesting {
                mut awaiting,
                mut offers,
            } => {
                for peer in awaiting.clone() {
                    if let Some(Message::ReservableReply(range)) =
                        self.transport.try_receive(peer, Tag::ReservableReply)?
                    {
                        awaiting.remove(&peer);
                        if range.is_empty() {
                            self.believed_nonempty.remove(&peer);
                        } else {
                            offers.push((peer, range));
                        }
                    }
                }
                if !awaiting.is_empty() {
                    self.phase = Phase::Requesting { awaiting, offers };
                    return Ok(());
                }
                // Largest offer, lowest rank on ties
                let best = offers
                    .iter()
                    .copied()
                    .max_by(|(pa, ra), (pb, rb)| ra.len().cmp(&rb.len()).then(pb.cmp(pa)));
                match best {
                    Some((peer, range)) => {
                        trace!(rank = self.rank, peer, len = range.len(), "attempting reservation");
                        self.transport.send(peer, Message::AttemptReservation(range))?;
                        self.phase = Phase::Reserving { peer, range };
                    }
                    None => self.request(handoff)?,
                }
            }
            Phase::Reserving { peer, range } => {
                match self.transport.try_receive(peer, Tag::ReservationReply)? {
                    Some(Message::ReservationReply(true)) => {
                        self.stats.stolen += 1;
                        debug!(rank = self.rank, peer, first = range.first, end = range.end, "reserved range");
                        self.take_on(range, handoff);
                    }
                    Some(_) => {
                        self.stats.rejected_attempts += 1;
                        self.request(handoff)?;
                    }
                    None => self.phase = Phase::Reserving { peer, range },
                }
            }
            Phase::WaitingTermination => {
                if self.ledger.is_none() {
                    if let Some(Message::Terminate) = self.transport.try_receive(0, Tag::Terminate)? {
                        self.phase = Phase::Terminated;
                        return Ok(());
                    }
                } else if self.ledger.as_ref().is_some_and(Ledger::complete) {
                    for peer in 1..self.transport.size() {
                        self.transport.send(peer, Message::Terminate)?;
                    }
                    info!("all ranks idle, pass terminated");
                    self.phase = Phase::Terminated;
                    return Ok(());
                }
                self.phase = Phase::WaitingTermination;
            }
            Phase::Terminated => self.phase = Phase::Terminated,
        }
        Ok(())
    }

    /// Split a newly owned range and start the worker on its active part
    fn take_on(&mut self, range: WorkRange, handoff: &Handoff) {
        let (active, reservable) =
            range.split(self.config.min_chunk_size, self.config.reservable_denominator);
        self.reservable = reservable;
        handoff.hand(active);
        self.phase = Phase::Active;
    }

    /// Ask every believed-non-empty peer for its reservable range, or go idle
    /// when there is nobody left to ask
    fn request(&mut self, handoff: &Handoff) -> Result<()> {
        if self.believed_nonempty.is_empty() {
            // The worker is parked; anything it found must precede the report
            self.flush_findings(handoff)?;
            match self.ledger.as_mut() {
                Some(ledger) => ledger.idle[0] = Some(self.reported),
                None => self.transport.send(
                    0,
                    Message::Idle {
                        reported: self.reported,
                    },
                )?,
            }
            debug!(rank = self.rank, reported = self.reported, "rank idle");
            self.phase = Phase::WaitingTermination;
            return Ok(());
        }
        for &peer in &self.believed_nonempty {
            self.transport.send(peer, Message::QueryReservable)?;
        }
        self.phase = Phase::Requesting {
            awaiting: self.believed_nonempty.clone(),
            offers: Vec::new(),
        };
        Ok(())
    }
}

/// One rank's endpoint of a distributed filtering pass
pub struct DistributedFilter<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: DistributedConfig,
}

impl<'a, T: Transport + ?Sized> DistributedFilter<'a, T> {
    pub fn new(transport: &'a T, config: DistributedConfig) -> Result<Self> {
        config.validate()?;
        Ok(DistributedFilter { transport, config })
    }

    /// Decide `check(i)` for every `i` in `[0, count)` cooperatively.
    ///
    /// Every rank must call this with the same `count`; a mismatch fails the
    /// pass on all ranks. Each index is checked exactly once across the job.
    pub fn run<C>(&self, count: u64, check: C) -> Result<FilterOutcome>
    where
        C: Fn(u64) -> Result<bool> + Sync,
    {
        let start = Instant::now();
        let rank = self.transport.rank();
        let size = self.transport.size();
        self.check_sizes(count)?;

        let (active, reservable) = WorkRange::share(count, rank, size)
            .split(self.config.min_chunk_size, self.config.reservable_denominator);
        info!(
            rank,
            size,
            count,
            active = active.len(),
            reservable = reservable.len(),
            "distributed filter starting"
        );

        let handoff = Handoff::new(active);
        let mut comms = Comms {
            transport: self.transport,
            config: &self.config,
            rank,
            phase: Phase::Active,
            reservable,
            believed_nonempty: (0..size).filter(|&p| p != rank).collect(),
            reported: 0,
            ledger: (rank == 0).then(|| Ledger::new(size)),
            stats: FilterStats {
                rank,
                ..Default::default()
            },
        };

        let result = thread::scope(|scope| {
            let worker = &handoff;
            let check = &check;
            scope.spawn(move || worker.work(check));
            let result = comms.run(&handoff);
            handoff.stop();
            result
        });
        result?;

        let mut stats = comms.stats;
        stats.processed = handoff.processed.load(Ordering::Relaxed);
        stats.found = comms.reported;
        stats.elapsed = start.elapsed();
        let redundant = comms
            .ledger
            .map(|ledger| ledger.redundant.into_iter().collect::<Vec<u64>>());
        info!(
            rank,
            processed = stats.processed,
            found = stats.found,
            stolen = stats.stolen,
            given = stats.given,
            "distributed filter finished"
        );
        Ok(FilterOutcome { redundant, stats })
    }

    /// All ranks must have loaded the same number of candidates
    fn check_sizes(&self, count: u64) -> Result<()> {
        match self.transport.gather(count)? {
            Some(sizes) => {
                let agree = sizes.iter().all(|&s| s == count);
                for peer in 1..self.transport.size() {
                    self.transport.send(peer, Message::StartupVerdict(agree))?;
                }
                if !agree {
                    error!(?sizes, "ranks loaded different candidate counts");
                    return Err(Error::SizeMismatch(sizes));
                }
            }
            None => match self.transport.receive(0, Tag::StartupVerdict)? {
                Message::StartupVerdict(true) => {}
                _ => {
                    error!(rank = self.transport.rank(), count, "rank 0 reported a size mismatch");
                    return Err(Error::SizeMismatch(vec![count]));
                }
            },
        }
        Ok(())
    }
}
