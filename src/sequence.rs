//! Sequence Monitor - feed gap detection.
//!
//! Tracks the last feed sequence number and counts how many numbers were
//! skipped. Purely observational: nothing is blocked, dropped or requested.

/// Outcome of observing one sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceStatus {
    /// First number seen this session
    First,
    /// Exactly `last_seen + 1`
    InOrder,
    /// Jumped ahead; `missing` numbers were skipped
    Gap { expected: u64, missing: u64 },
    /// Duplicate or out-of-order (`<= last_seen`)
    Stale { last_seen: u64 },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceMonitor {
    last_seen: Option<u64>,
    /// Total sequence numbers skipped
    lost: u64,
    /// Number of distinct jumps
    gaps: u64,
    stale: u64,
}

impl SequenceMonitor {
    pub const fn new() -> Self {
        Self {
            last_seen: None,
            lost: 0,
            gaps: 0,
            stale: 0,
        }
    }

    /// Record one sequence number.
    ///
    /// A stale number resets `last_seen` to itself, so a feed that restarts
    /// from a lower number is followed rather than counted as loss.
    #[inline]
    pub fn observe(&mut self, seq: u64) -> SequenceStatus {
        let status = match self.last_seen {
            None => SequenceStatus::First,
            Some(last) if seq <= last => {
                self.stale += 1;
                SequenceStatus::Stale { last_seen: last }
            }
            Some(last) if seq == last + 1 => SequenceStatus::InOrder,
            Some(last) => {
                let missing = seq - last - 1;
                self.lost += missing;
                self.gaps += 1;
                SequenceStatus::Gap {
                    expected: last + 1,
                    missing,
                }
            }
        };
        self.last_seen = Some(seq);
        status
    }

    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    /// Total sequence numbers skipped so far
    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn stale(&self) -> u64 {
        self.stale
    }
}
