// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! A fixed group of cooperating ranks and the collective operations the
//! binarization pipeline needs.
//!
//! Every rank holds a [`Communicator`]. Ranks are linked pairwise by unbounded
//! channels and share one barrier and one abort flag. Rank [`ROOT`] is the
//! orchestrator: it is the source of [`Communicator::scatter`] and
//! [`Communicator::broadcast_threshold`] and the destination of
//! [`Communicator::reduce_histogram`] and [`Communicator::gather`].
//!
//! Each collective ends with a group barrier, so no rank starts the next
//! phase before every rank has completed its part of the current one.
//!
//! There are no timeouts. A rank that fails simply drops its communicator
//! without calling [`Communicator::finalize`]; this raises the abort flag and
//! every other rank's pending or future collective returns an error.

use std::future::Future;
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Barrier};

use crate::error::BinarizeError;
use crate::histogram_funcs::{reduce_histograms, Histogram};

/// Rank of the orchestrator.
pub const ROOT: usize = 0;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommError {
    #[error("run aborted by another rank")]
    Aborted,

    #[error("lost link to rank {0}")]
    PeerLost(usize),

    #[error("expected {expected} from rank {rank}, got {got}")]
    UnexpectedPacket {
        rank: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("chunk from rank {rank} holds {actual} bytes, expected {expected}")]
    ChunkSize {
        rank: usize,
        expected: usize,
        actual: usize,
    },

    #[error("buffer holds {actual} bytes, collective needs {needed}")]
    BufferTooSmall {
        needed: usize,
        actual: usize,
    },

    #[error("root rank called a collective without its data")]
    MissingRootData,
}

impl CommError {
    /// True for errors that only report that another rank failed first.
    pub fn is_secondary(&self) -> bool {
        matches!(self, CommError::Aborted | CommError::PeerLost(_))
    }
}

// What travels over the links between ranks.
#[derive(Debug)]
enum Packet {
    Chunk(Vec<u8>),
    Histogram(Box<Histogram>),
    Threshold(u8),
}

impl Packet {
    fn kind(&self) -> &'static str {
        match self {
            Packet::Chunk(_) => "chunk",
            Packet::Histogram(_) => "histogram",
            Packet::Threshold(_) => "threshold",
        }
    }
}

/// One rank's endpoint into the group.
pub struct Communicator {
    rank: usize,
    size: usize,

    // Indexed by peer rank; the entry for our own rank is None.
    outbox: Vec<Option<UnboundedSender<Packet>>>,
    inbox: Vec<Option<UnboundedReceiver<Packet>>>,

    barrier: Arc<Barrier>,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,

    // Set by finalize(). A communicator dropped without it aborts the group.
    finalized: bool,
}

impl Communicator {
    /// Creates the endpoints of a group of `size` ranks; element `i` is rank
    /// `i`. Returns an empty vector when `size` is 0.
    pub fn create_group(size: usize) -> Vec<Communicator> {
        if size == 0 {
            return Vec::new();
        }
        let barrier = Arc::new(Barrier::new(size));
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_tx = Arc::new(abort_tx);

        let mut outboxes: Vec<Vec<Option<UnboundedSender<Packet>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<UnboundedReceiver<Packet>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for source in 0..size {
            for dest in 0..size {
                if source != dest {
                    let (tx, rx) = unbounded_channel();
                    outboxes[source][dest] = Some(tx);
                    inboxes[dest][source] = Some(rx);
                }
            }
        }

        outboxes.into_iter().zip(inboxes).enumerate()
            .map(|(rank, (outbox, inbox))| Communicator{
                rank, size, outbox, inbox,
                barrier: barrier.clone(),
                abort_tx: abort_tx.clone(),
                abort_rx: abort_rx.clone(),
                finalized: false,
            })
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Raises the group's abort flag. Every rank blocked in, or later
    /// entering, a collective fails with [`CommError::Aborted`].
    pub fn abort(&self) {
        let already_aborted = self.abort_tx.send_replace(true);
        if !already_aborted {
            warn!("Rank {} aborting the group", self.rank);
        }
    }

    pub fn is_aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    /// Waits until every rank of the group reaches this point.
    pub async fn barrier(&mut self) -> Result<(), CommError> {
        let mut abort = self.abort_rx.clone();
        tokio::select! {
            _ = self.barrier.wait() => Ok(()),
            _ = abort.wait_for(|aborted| *aborted) => Err(CommError::Aborted),
        }
    }

    /// Distributes `chunk_len` bytes to every rank. On the root,
    /// `send_buffer` must hold at least `chunk_len * size` bytes; rank `r`
    /// receives bytes `[r * chunk_len, (r + 1) * chunk_len)`, the root
    /// included. Other ranks pass None. Bytes past `chunk_len * size` are not
    /// sent anywhere.
    pub async fn scatter(&mut self, send_buffer: Option<&[u8]>, chunk_len: usize)
                         -> Result<Vec<u8>, CommError> {
        let chunk = if self.is_root() {
            let buffer = send_buffer.ok_or(CommError::MissingRootData)?;
            let needed = chunk_len * self.size;
            if buffer.len() < needed {
                return Err(CommError::BufferTooSmall{needed, actual: buffer.len()});
            }
            for dest in 1..self.size {
                let piece = buffer[dest * chunk_len .. (dest + 1) * chunk_len].to_vec();
                self.send_to(dest, Packet::Chunk(piece))?;
            }
            buffer[..chunk_len].to_vec()
        } else {
            self.recv_chunk(ROOT, chunk_len).await?
        };
        debug!("Rank {} holds a {} byte chunk", self.rank, chunk.len());
        self.barrier().await?;
        Ok(chunk)
    }

    /// Sums every rank's `local` histogram. Only the root gets the result.
    pub async fn reduce_histogram(&mut self, local: &Histogram)
                                  -> Result<Option<Histogram>, CommError> {
        let global = if self.is_root() {
            let mut parts = Vec::with_capacity(self.size);
            parts.push(*local);
            for source in 1..self.size {
                match self.recv_from(source).await? {
                    Packet::Histogram(histogram) => parts.push(*histogram),
                    other => return Err(CommError::UnexpectedPacket{
                        rank: source, expected: "histogram", got: other.kind()}),
                }
            }
            Some(reduce_histograms(&parts))
        } else {
            self.send_to(ROOT, Packet::Histogram(Box::new(*local)))?;
            None
        };
        self.barrier().await?;
        Ok(global)
    }

    /// Delivers the root's `threshold` to every rank. Other ranks pass None.
    pub async fn broadcast_threshold(&mut self, threshold: Option<u8>)
                                     -> Result<u8, CommError> {
        let threshold = if self.is_root() {
            let threshold = threshold.ok_or(CommError::MissingRootData)?;
            for dest in 1..self.size {
                self.send_to(dest, Packet::Threshold(threshold))?;
            }
            threshold
        } else {
            match self.recv_from(ROOT).await? {
                Packet::Threshold(threshold) => threshold,
                other => return Err(CommError::UnexpectedPacket{
                    rank: ROOT, expected: "threshold", got: other.kind()}),
            }
        };
        self.barrier().await?;
        Ok(threshold)
    }

    /// Collects every rank's `chunk` into the root's `recv_buffer`, rank `r`'s
    /// chunk landing at `[r * len, (r + 1) * len)`. All chunks must have the
    /// same length. Bytes of `recv_buffer` past `len * size` are left as they
    /// were. Other ranks pass None.
    pub async fn gather(&mut self, chunk: Vec<u8>, recv_buffer: Option<&mut [u8]>)
                        -> Result<(), CommError> {
        if self.is_root() {
            let buffer = recv_buffer.ok_or(CommError::MissingRootData)?;
            let chunk_len = chunk.len();
            let needed = chunk_len * self.size;
            if buffer.len() < needed {
                return Err(CommError::BufferTooSmall{needed, actual: buffer.len()});
            }
            buffer[..chunk_len].copy_from_slice(&chunk);
            for source in 1..self.size {
                let piece = self.recv_chunk(source, chunk_len).await?;
                buffer[source * chunk_len .. (source + 1) * chunk_len]
                    .copy_from_slice(&piece);
            }
        } else {
            self.send_to(ROOT, Packet::Chunk(chunk))?;
        }
        self.barrier().await
    }

    /// Final rendezvous of the run. Afterwards the communicator is released
    /// without aborting the group.
    pub async fn finalize(mut self) -> Result<(), CommError> {
        self.barrier().await?;
        self.finalized = true;
        Ok(())
    }

    fn send_to(&self, dest: usize, packet: Packet) -> Result<(), CommError> {
        let link = self.outbox[dest].as_ref().ok_or(CommError::PeerLost(dest))?;
        link.send(packet).map_err(|_| CommError::PeerLost(dest))
    }

    async fn recv_from(&mut self, source: usize) -> Result<Packet, CommError> {
        let mut abort = self.abort_rx.clone();
        let link = self.inbox[source].as_mut().ok_or(CommError::PeerLost(source))?;
        tokio::select! {
            packet = link.recv() => packet.ok_or(CommError::PeerLost(source)),
            _ = abort.wait_for(|aborted| *aborted) => Err(CommError::Aborted),
        }
    }

    async fn recv_chunk(&mut self, source: usize, expected: usize)
                        -> Result<Vec<u8>, CommError> {
        match self.recv_from(source).await? {
            Packet::Chunk(chunk) if chunk.len() == expected => Ok(chunk),
            Packet::Chunk(chunk) => Err(CommError::ChunkSize{
                rank: source, expected, actual: chunk.len()}),
            other => Err(CommError::UnexpectedPacket{
                rank: source, expected: "chunk", got: other.kind()}),
        }
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        if !self.finalized {
            self.abort();
        }
    }
}

/// Runs `worker` once per rank of a new group of `size` ranks, each on its own
/// tokio task, and waits for all of them.
///
/// Returns each rank's value in rank order. If any rank fails, the result is
/// the error that caused the run to abort: the first error that is not merely
/// a consequence of another rank going down. A panicking rank is reported as
/// [`BinarizeError::WorkerPanicked`].
pub async fn run_group<T, F, Fut>(size: usize, mut worker: F)
                                  -> Result<Vec<T>, BinarizeError>
where
    F: FnMut(Communicator) -> Fut,
    Fut: Future<Output = Result<T, BinarizeError>> + Send + 'static,
    T: Send + 'static,
{
    if size == 0 {
        return Err(BinarizeError::NoWorkers);
    }
    let handles: Vec<_> = Communicator::create_group(size).into_iter()
        .map(|comm| tokio::spawn(worker(comm)))
        .collect();

    let mut values = Vec::with_capacity(size);
    let mut errors = Vec::new();
    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(value)) => values.push(value),
            Ok(Err(e)) => {
                debug!("Rank {} failed: {}", rank, e);
                errors.push(e);
            },
            Err(join_error) => {
                warn!("Rank {} did not complete: {}", rank, join_error);
                errors.push(BinarizeError::WorkerPanicked{rank});
            },
        }
    }
    if errors.is_empty() {
        return Ok(values);
    }
    let root_cause = errors.iter().position(|e| !e.is_secondary()).unwrap_or(0);
    Err(errors.swap_remove(root_cause))
}

// mod tests.
