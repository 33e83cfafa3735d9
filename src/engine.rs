//! Engine - matching-thread event loop with CPU pinning and warm-up.
//!
//! Wraps the matching engine with the transport queue: busy-polls the
//! consumer end, runs each item through the sequence monitor, applies it to
//! the book and records wire-to-match latency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use hdrhistogram::Histogram;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::command::{Command, MsgType, Price, QueueItem};
use crate::listener::Listener;
use crate::matching::MatchingEngine;
use crate::queue::Consumer;
use crate::sequence::{SequenceMonitor, SequenceStatus};

/// Empty polls spent spinning before the loop starts yielding the core.
pub const SPIN_LIMIT: u32 = 10_000;

/// Counters owned by the matching thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub processed: u64,
    pub submits: u64,
    pub cancels: u64,
}

/// The main engine that processes items from the transport queue.
pub struct Engine<L: Listener> {
    /// The underlying matching engine
    pub matcher: MatchingEngine<L>,
    sequence: SequenceMonitor,
    stats: EngineStats,
}

impl<L: Listener> Engine<L> {
    /// Create a new engine with the specified order capacity.
    pub fn new(capacity: u32, listener: L) -> Self {
        Self {
            matcher: MatchingEngine::new(capacity, listener),
            sequence: SequenceMonitor::new(),
            stats: EngineStats::default(),
        }
    }

    /// Run the engine event loop until `shutdown` is set and the queue is
    /// drained.
    ///
    /// Items are read in place with `peek`/`advance`. When the queue is empty
    /// the loop spins for [`SPIN_LIMIT`] polls, then yields between polls.
    pub fn run<C: Clock>(
        &mut self,
        input: &mut Consumer<QueueItem>,
        shutdown: &AtomicBool,
        clock: &C,
        latency: &mut Histogram<u64>,
    ) {
        info!(capacity = input.capacity(), "engine loop started");
        let mut idle: u32 = 0;

        loop {
            match input.peek() {
                Some(item) => {
                    idle = 0;
                    self.process_item(&item);
                    let recv_ns = item.recv_ns;
                    item.advance();
                    latency.saturating_record(clock.now_ns().saturating_sub(recv_ns));
                }
                None => {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    if idle < SPIN_LIMIT {
                        idle += 1;
                        std::hint::spin_loop();
                    } else {
                        thread::yield_now();
                    }
                }
            }
        }

        info!(
            processed = self.stats.processed,
            lost = self.sequence.lost(),
            gaps = self.sequence.gaps(),
            resting = self.matcher.order_count(),
            "engine loop stopped"
        );
    }

    /// Apply one transport item.
    ///
    /// Sequenced items (`sequence != 0`) go through the gap monitor first;
    /// the item is processed whatever the monitor says.
    #[inline]
    pub fn process_item(&mut self, item: &QueueItem) {
        if item.sequence != 0 {
            match self.sequence.observe(item.sequence) {
                SequenceStatus::Gap { expected, missing } => {
                    warn!(expected, got = item.sequence, missing, "feed sequence gap");
                }
                SequenceStatus::Stale { last_seen } => {
                    debug!(last_seen, got = item.sequence, "stale feed sequence");
                }
                SequenceStatus::First | SequenceStatus::InOrder => {}
            }
        }

        match item.kind {
            MsgType::AddOrder => self.stats.submits += 1,
            MsgType::CancelOrder => self.stats.cancels += 1,
        }
        self.process_command(item.command());
    }

    /// Apply a command directly, bypassing the queue (tests, benchmarks).
    #[inline]
    pub fn process_command(&mut self, cmd: Command) {
        self.stats.processed += 1;
        self.matcher.process(cmd);
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn sequence(&self) -> &SequenceMonitor {
        &self.sequence
    }

    pub fn listener(&self) -> &L {
        self.matcher.listener()
    }

    pub fn listener_mut(&mut self) -> &mut L {
        self.matcher.listener_mut()
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.matcher.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.matcher.best_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<Price> {
        self.matcher.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.matcher.order_count()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }
}

/// Pin the current thread to the core with id `core_id`.
///
/// Returns `false` if the core does not exist or the OS refused.
pub fn pin_to_core(core_id: usize) -> bool {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        return false;
    };
    match core_ids.into_iter().find(|c| c.id == core_id) {
        Some(core) => core_affinity::set_for_current(core),
        None => false,
    }
}

/// Id of the last available core, typically the one furthest from OS
/// interrupt handling.
pub fn last_core() -> Option<usize> {
    core_affinity::get_core_ids()?.last().map(|c| c.id)
}
