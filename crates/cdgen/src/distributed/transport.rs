//! Rank-addressed message transport
//!
//! A transport delivers typed messages between the ranks of one job.
//! Receiving is a non-blocking probe for a message from a given source with a
//! given tag, so a rank can poll for different kinds of messages without one
//! kind blocking another.
//!
//! Two implementations are provided: `LocalHub` connects threads of one
//! process, `TcpTransport` connects one process per rank.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::protocol::{read_message, write_message, Handshake, Message, Tag};
use crate::{Error, Result};

/// Sleep between probes of a blocking receive
const RECEIVE_POLL: Duration = Duration::from_millis(1);

/// Total time to keep retrying a TCP connection to a peer
const CONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Delay between connection retries, capped at this maximum
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

pub trait Transport: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(&self, dest: usize, msg: Message) -> Result<()>;

    /// Take the oldest pending message from `source` with `tag`, if any
    fn try_receive(&self, source: usize, tag: Tag) -> Result<Option<Message>>;

    /// Block until a message from `source` with `tag` arrives
    fn receive(&self, source: usize, tag: Tag) -> Result<Message> {
        loop {
            if let Some(msg) = self.try_receive(source, tag)? {
                return Ok(msg);
            }
            thread::sleep(RECEIVE_POLL);
        }
    }

    /// Whether the connection to `peer` has gone away. Queued messages from
    /// it can still be received.
    fn disconnected(&self, _peer: usize) -> bool {
        false
    }

    /// Collect one value per rank at rank 0. Returns the values in rank order
    /// on rank 0 and `None` elsewhere.
    fn gather(&self, value: u64) -> Result<Option<Vec<u64>>> {
        if self.rank() != 0 {
            self.send(0, Message::Gather(value))?;
            return Ok(None);
        }
        let mut values = vec![value];
        for source in 1..self.size() {
            match self.receive(source, Tag::Gather)? {
                Message::Gather(v) => values.push(v),
                other => {
                    return Err(Error::Transport(format!(
                        "expected a gather from rank {}, got {:?}",
                        source, other
                    )))
                }
            }
        }
        Ok(Some(values))
    }

    /// Stop the whole job after a fatal error
    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    queues: HashMap<(usize, Tag), VecDeque<Message>>,
    closed: HashSet<usize>,
}

/// Incoming messages of one rank, keyed by source and tag
#[derive(Debug, Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, source: usize, msg: Message) {
        self.lock()
            .queues
            .entry((source, msg.tag()))
            .or_default()
            .push_back(msg);
    }

    fn take(&self, source: usize, tag: Tag) -> Option<Message> {
        self.lock()
            .queues
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
    }

    fn close(&self, source: usize) {
        self.lock().closed.insert(source);
    }

    fn is_closed(&self, source: usize) -> bool {
        self.lock().closed.contains(&source)
    }
}

fn check_rank(rank: usize, size: usize) -> Result<()> {
    if rank >= size {
        return Err(Error::Transport(format!(
            "rank {} out of range for {} ranks",
            rank, size
        )));
    }
    Ok(())
}

// =============================================================================
// In-process transport
// =============================================================================

/// Creates connected in-process transports, one per rank
pub struct LocalHub;

impl LocalHub {
    pub fn new(size: usize) -> Vec<LocalTransport> {
        let mailboxes: Arc<Vec<Mailbox>> = Arc::new((0..size).map(|_| Mailbox::default()).collect());
        (0..size)
            .map(|rank| LocalTransport {
                rank,
                mailboxes: Arc::clone(&mailboxes),
            })
            .collect()
    }
}

/// One rank's end of a `LocalHub`
#[derive(Debug, Clone)]
pub struct LocalTransport {
    rank: usize,
    mailboxes: Arc<Vec<Mailbox>>,
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn send(&self, dest: usize, msg: Message) -> Result<()> {
        check_rank(dest, self.size())?;
        self.mailboxes[dest].deliver(self.rank, msg);
        Ok(())
    }

    fn try_receive(&self, source: usize, tag: Tag) -> Result<Option<Message>> {
        check_rank(source, self.size())?;
        Ok(self.mailboxes[self.rank].take(source, tag))
    }
}

// =============================================================================
// TCP transport
// =============================================================================

/// One process per rank, fully connected over TCP.
///
/// Every rank listens on its own address. A rank connects to all lower ranks
/// and accepts connections from all higher ranks; the first frame on each
/// connection is a `Handshake` naming the connecting rank. A reader thread
/// per peer moves incoming messages into the local mailbox.
pub struct TcpTransport {
    rank: usize,
    size: usize,
    writers: Vec<Option<Mutex<BufWriter<TcpStream>>>>,
    mailbox: Arc<Mailbox>,
}

impl TcpTransport {
    /// Join the job whose ranks listen on `peers`, as rank `rank`
    pub fn connect(rank: usize, peers: &[SocketAddr]) -> Result<Self> {
        let size = peers.len();
        check_rank(rank, size)?;
        let listener = TcpListener::bind(peers[rank])?;
        info!(rank, size, addr = %peers[rank], "listening for peers");

        let mailbox = Arc::new(Mailbox::default());
        let mut writers: Vec<Option<Mutex<BufWriter<TcpStream>>>> = (0..size).map(|_| None).collect();

        for (peer, addr) in peers.iter().enumerate().take(rank) {
            let mut stream = Self::connect_with_retry(*addr)?;
            write_message(&mut stream, &Handshake { rank })?;
            Self::spawn_reader(peer, &stream, &mailbox)?;
            writers[peer] = Some(Mutex::new(BufWriter::new(stream)));
            debug!(rank, peer, "connected to peer");
        }

        for _ in rank + 1..size {
            let (mut stream, remote) = listener.accept()?;
            stream.set_nodelay(true)?;
            let Handshake { rank: peer } = read_message(&mut stream)?;
            if peer <= rank || peer >= size || writers[peer].is_some() {
                return Err(Error::Transport(format!(
                    "unexpected handshake from {} claiming rank {}",
                    remote, peer
                )));
            }
            Self::spawn_reader(peer, &stream, &mailbox)?;
            writers[peer] = Some(Mutex::new(BufWriter::new(stream)));
            debug!(rank, peer, "accepted peer");
        }

        info!(rank, size, "all peers connected");
        Ok(TcpTransport {
            rank,
            size,
            writers,
            mailbox,
        })
    }

    /// Retries with exponential backoff while the peer is not yet listening
    fn connect_with_retry(addr: SocketAddr) -> Result<TcpStream> {
        let deadline = Instant::now() + CONNECT_DEADLINE;
        let mut delay = Duration::from_millis(100);
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    if Instant::now() + delay > deadline {
                        return Err(Error::Transport(format!(
                            "failed to connect to {}: {}",
                            addr, e
                        )));
                    }
                    debug!(%addr, error = %e, ?delay, "connect failed, retrying");
                    thread::sleep(delay);
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    fn spawn_reader(peer: usize, stream: &TcpStream, mailbox: &Arc<Mailbox>) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mailbox = Arc::clone(mailbox);
        thread::Builder::new()
            .name(format!("cdgen-peer-{}", peer))
            .spawn(move || loop {
                match read_message::<_, Message>(&mut reader) {
                    Ok(msg) => mailbox.deliver(peer, msg),
                    Err(e) => {
                        debug!(peer, error = %e, "peer connection closed");
                        mailbox.close(peer);
                        return;
                    }
                }
            })?;
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, msg: Message) -> Result<()> {
        check_rank(dest, self.size)?;
        if dest == self.rank {
            self.mailbox.deliver(dest, msg);
            return Ok(());
        }
        let writer = self.writers[dest]
            .as_ref()
            .ok_or_else(|| Error::Transport(format!("no connection to rank {}", dest)))?;
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_message(&mut *writer, &msg)
            .map_err(|e| Error::Transport(format!("send to rank {} failed: {}", dest, e)))
    }

    fn try_receive(&self, source: usize, tag: Tag) -> Result<Option<Message>> {
        check_rank(source, self.size)?;
        Ok(self.mailbox.take(source, tag))
    }

    fn disconnected(&self, peer: usize) -> bool {
        peer != self.rank && self.mailbox.is_closed(peer)
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<Message> {
        loop {
            if let Some(msg) = self.try_receive(source, tag)? {
                return Ok(msg);
            }
            if self.disconnected(source) {
                // A message may have landed between the probe and the check
                return self.try_receive(source, tag)?.ok_or_else(|| {
                    Error::Transport(format!("rank {} disconnected while awaiting {:?}", source, tag))
                });
            }
            thread::sleep(RECEIVE_POLL);
        }
    }

    fn abort(&self, code: i32) -> ! {
        warn!(rank = self.rank, code, "aborting job");
        for writer in self.writers.iter().flatten() {
            let writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        std::process::exit(code)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for writer in self.writers.iter().flatten() {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = std::io::Write::flush(&mut *writer);
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::protocol::WorkRange;

    #[test]
    fn test_local_probe_by_tag() {
        let hub = LocalHub::new(2);
        hub[1].send(0, Message::RedundantIndex(3)).unwrap();
        hub[1].send(0, Message::QueryReservable).unwrap();
        hub[1].send(0, Message::RedundantIndex(4)).unwrap();

        assert_eq!(hub[0].try_receive(1, Tag::Terminate).unwrap(), None);
        assert_eq!(
            hub[0].try_receive(1, Tag::QueryReservable).unwrap(),
            Some(Message::QueryReservable)
        );
        assert_eq!(
            hub[0].receive(1, Tag::RedundantIndex).unwrap(),
            Message::RedundantIndex(3)
        );
        assert_eq!(
            hub[0].receive(1, Tag::RedundantIndex).unwrap(),
            Message::RedundantIndex(4)
        );
        assert!(hub[0].send(2, Message::Terminate).is_err());
    }

    #[test]
    fn test_local_gather() {
        let hub = LocalHub::new(3);
        let results: Vec<Option<Vec<u64>>> = thread::scope(|scope| {
            let handles: Vec<_> = hub
                .iter()
                .map(|t| scope.spawn(move || t.gather(10 + t.rank() as u64).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0], Some(vec![10, 11, 12]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn test_tcp_exchange() {
        let addrs: Vec<SocketAddr> = (0..3)
            .map(|_| {
                let l = TcpListener::bind("127.0.0.1:0").unwrap();
                l.local_addr().unwrap()
            })
            .collect();
        let transports: Vec<TcpTransport> = thread::scope(|scope| {
            let handles: Vec<_> = (0..3)
                .map(|rank| {
                    let addrs = &addrs;
                    scope.spawn(move || TcpTransport::connect(rank, addrs).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let range = WorkRange::new(5, 9);
        transports[2].send(0, Message::ReservableReply(range)).unwrap();
        transports[0].send(1, Message::Terminate).unwrap();
        transports[1].send(1, Message::Idle { reported: 2 }).unwrap();

        assert_eq!(
            transports[0].receive(2, Tag::ReservableReply).unwrap(),
            Message::ReservableReply(range)
        );
        assert_eq!(transports[1].receive(0, Tag::Terminate).unwrap(), Message::Terminate);
        assert_eq!(
            transports[1].receive(1, Tag::Idle).unwrap(),
            Message::Idle { reported: 2 }
        );
    }
}
