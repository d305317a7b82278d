//! Wire protocol for the distributed redundancy filter
//!
//! Defines the messages ranks exchange, the work ranges they trade, and the
//! length-prefixed framing used by the TCP transport.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Half-open range `[first, end)` of candidate indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkRange {
    pub first: u64,
    pub end: u64,
}

impl WorkRange {
    pub const EMPTY: WorkRange = WorkRange { first: 0, end: 0 };

    pub fn new(first: u64, end: u64) -> Self {
        WorkRange {
            first,
            end: end.max(first),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first >= self.end
    }

    /// Split into an active part and a reservable part holding the last
    /// `1 / denominator` of the range. Ranges shorter than `min_chunk` stay
    /// entirely active.
    pub fn split(self, min_chunk: u64, denominator: u64) -> (WorkRange, WorkRange) {
        if self.len() < min_chunk || denominator < 2 {
            return (self, WorkRange::EMPTY);
        }
        let reserved = self.len() / denominator;
        let boundary = self.end - reserved;
        (
            WorkRange::new(self.first, boundary),
            WorkRange::new(boundary, self.end),
        )
    }

    /// The `rank`-th of `size` contiguous shares of `[0, count)`. Earlier
    /// ranks take one extra index each when `count` does not divide evenly.
    pub fn share(count: u64, rank: usize, size: usize) -> WorkRange {
        let size = size.max(1) as u64;
        let rank = rank as u64;
        let base = count / size;
        let extra = count % size;
        let first = rank * base + rank.min(extra);
        let len = base + u64::from(rank < extra);
        WorkRange::new(first, first + len)
    }
}

/// Message kinds, used to probe mailboxes without decoding payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Gather,
    StartupVerdict,
    QueryReservable,
    ReservableReply,
    AttemptReservation,
    ReservationReply,
    RedundantIndex,
    Idle,
    Terminate,
}

/// Messages exchanged between ranks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A rank's loaded input size, sent to rank 0 at startup
    Gather(u64),
    /// Rank 0's answer to the startup gather: whether all sizes agree
    StartupVerdict(bool),
    /// "What range could you give away?"
    QueryReservable,
    /// The sender's current reservable range, possibly empty
    ReservableReply(WorkRange),
    /// Claim exactly this range from the receiver
    AttemptReservation(WorkRange),
    /// Whether the claimed range was handed over
    ReservationReply(bool),
    /// A candidate index found redundant, streamed to rank 0
    RedundantIndex(u64),
    /// The sender has no work left and has reported `reported` redundant
    /// indices in total
    Idle { reported: u64 },
    /// Rank 0 ends the pass
    Terminate,
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Message::Gather(_) => Tag::Gather,
            Message::StartupVerdict(_) => Tag::StartupVerdict,
            Message::QueryReservable => Tag::QueryReservable,
            Message::ReservableReply(_) => Tag::ReservableReply,
            Message::AttemptReservation(_) => Tag::AttemptReservation,
            Message::ReservationReply(_) => Tag::ReservationReply,
            Message::RedundantIndex(_) => Tag::RedundantIndex,
            Message::Idle { .. } => Tag::Idle,
            Message::Terminate => Tag::Terminate,
        }
    }
}

/// First frame on every TCP connection: the connecting rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub rank: usize,
}

/// Write a length-prefixed bincode message to a stream.
///
/// Format: 4-byte little-endian length + bincode payload.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

/// Read a length-prefixed bincode message from a stream.
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    bincode::deserialize(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
