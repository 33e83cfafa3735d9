//! Feed Handler - network-thread side of the pipeline.
//!
//! Receives datagrams, decodes each one straight into a claimed queue slot,
//! stamps the receipt time and publishes it to the matching thread. A full
//! queue is backpressure: the datagram is dropped and counted, never retried.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::command::QueueItem;
use crate::queue::Producer;
use crate::wire::{self, DecodeError};

/// How long a blocking receive waits before re-checking the shutdown flag.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Datagrams up to this size are read whole; longer ones are truncated by the
/// socket, which the codec tolerates (trailing bytes are ignored).
pub const RECV_BUFFER_LEN: usize = 2048;

/// Counters shared with the telemetry side.
///
/// Written only by the feed thread; readers get an approximate snapshot.
#[derive(Debug, Default)]
pub struct FeedStats {
    pub received: AtomicU64,
    pub accepted: AtomicU64,
    /// Queue was full
    pub dropped: AtomicU64,
    /// Failed to decode
    pub malformed: AtomicU64,
    /// Deepest queue occupancy seen right after a publish
    pub high_water: AtomicU64,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub high_water: u64,
}

/// What happened to one datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedOutcome {
    Accepted,
    Dropped,
    Malformed(DecodeError),
}

pub struct FeedHandler<C: Clock> {
    producer: Producer<QueueItem>,
    clock: C,
    stats: Arc<FeedStats>,
}

impl<C: Clock> FeedHandler<C> {
    pub fn new(producer: Producer<QueueItem>, clock: C, stats: Arc<FeedStats>) -> Self {
        Self {
            producer,
            clock,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<FeedStats> {
        &self.stats
    }

    /// Decode one datagram into the queue.
    ///
    /// A full queue is checked before decoding, so a malformed datagram that
    /// arrives while full counts as dropped.
    #[inline]
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> FeedOutcome {
        let recv_ns = self.clock.now_ns();
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let mut slot = match self.producer.claim() {
            Some(slot) => slot,
            None => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return FeedOutcome::Dropped;
            }
        };

        if let Err(err) = wire::decode_into(datagram, &mut slot) {
            // Abandoned claim: nothing is published
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            debug!(error = %err, len = datagram.len(), "malformed datagram");
            return FeedOutcome::Malformed(err);
        }
        slot.recv_ns = recv_ns;
        slot.publish();

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        self.stats
            .high_water
            .fetch_max(self.producer.len() as u64, Ordering::Relaxed);
        FeedOutcome::Accepted
    }

    /// Receive datagrams until `shutdown` is set.
    ///
    /// Uses a read timeout so the flag is polled at least every
    /// [`RECV_TIMEOUT`]. Returns on the first non-timeout socket error.
    pub fn run_udp(&mut self, socket: &UdpSocket, shutdown: &AtomicBool) -> io::Result<()> {
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let mut buf = [0u8; RECV_BUFFER_LEN];

        info!(addr = ?socket.local_addr().ok(), "feed handler receiving");

        while !shutdown.load(Ordering::Acquire) {
            match socket.recv_from(&mut buf) {
                Ok((len, _peer)) => {
                    self.handle_datagram(&buf[..len]);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        info!(stats = ?self.stats.snapshot(), "feed handler stopped");
        Ok(())
    }
}
