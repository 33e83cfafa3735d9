//! Clocks for receipt and latency timestamps.
//!
//! Both threads need the same notion of "now" in nanoseconds. The clock is a
//! plain `Copy` value built once at startup and handed to each thread; there
//! is no global instance.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

/// A monotonic nanosecond clock.
pub trait Clock {
    /// Nanoseconds since this clock's origin.
    fn now_ns(&self) -> u64;
}

/// `std::time::Instant` relative to a fixed origin.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Time-stamp counter clock, calibrated against the OS monotonic clock.
///
/// Reading the counter is a single instruction, which keeps timestamping off
/// the critical path. Assumes an invariant TSC synchronised across cores.
#[derive(Clone, Copy, Debug)]
pub struct TscClock {
    origin_cycles: u64,
    nanos_per_cycle: f64,
}

impl TscClock {
    /// Measure the counter frequency over `window`. Blocks for that long.
    pub fn calibrate(window: Duration) -> Self {
        let start = Instant::now();
        let start_cycles = read_cycles();

        thread::sleep(window);

        let end_cycles = read_cycles();
        let elapsed_ns = start.elapsed().as_nanos() as f64;
        let cycles = end_cycles.wrapping_sub(start_cycles);

        let nanos_per_cycle = if cycles == 0 {
            1.0
        } else {
            elapsed_ns / cycles as f64
        };

        info!(
            ghz = 1.0 / nanos_per_cycle,
            ns_per_cycle = nanos_per_cycle,
            window_ms = window.as_millis() as u64,
            "calibrated cycle counter"
        );

        Self {
            origin_cycles: end_cycles,
            nanos_per_cycle,
        }
    }

    pub fn nanos_per_cycle(&self) -> f64 {
        self.nanos_per_cycle
    }

    /// Convert a cycle delta to nanoseconds.
    #[inline]
    pub fn cycles_to_nanos(&self, cycles: u64) -> u64 {
        (cycles as f64 * self.nanos_per_cycle) as u64
    }
}

impl Clock for TscClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.cycles_to_nanos(read_cycles().wrapping_sub(self.origin_cycles))
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn read_cycles() -> u64 {
    let mut aux = 0u32;
    // SAFETY: rdtscp is available on every x86_64 CPU we target and has no
    // memory side effects beyond writing `aux`.
    unsafe { std::arch::x86_64::__rdtscp(&mut aux) }
}

/// Fallback: nanoseconds since first use, so calibration lands near 1.0.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn read_cycles() -> u64 {
    static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}
