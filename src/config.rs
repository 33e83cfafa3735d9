//! Pipeline configuration.
//!
//! Parsed from the command line with `clap` and validated before any thread
//! is spawned; misconfiguration is the only fatal error class.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::arena::NULL_INDEX;
use crate::queue::CapacityError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid queue capacity: {0}")]
    QueueCapacity(#[from] CapacityError),

    #[error("book capacity must be between 1 and {max}, got {requested}")]
    BookCapacity { requested: u32, max: u32 },

    #[error("feed and engine threads cannot share core {0}")]
    SharedCore(usize),

    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// UDP address to receive the feed on
    #[arg(long, default_value = "127.0.0.1:1234")]
    pub bind: SocketAddr,

    /// Transport queue slots (power of two)
    #[arg(long, default_value_t = 65_536)]
    pub queue_capacity: usize,

    /// Maximum resting orders
    #[arg(long, default_value_t = 1_000_000)]
    pub book_capacity: u32,

    /// Core to pin the feed thread to
    #[arg(long)]
    pub feed_core: Option<usize>,

    /// Core to pin the engine thread to
    #[arg(long)]
    pub engine_core: Option<usize>,

    /// Stop after this many seconds (otherwise runs until Enter is pressed)
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Cycle-counter calibration window
    #[arg(long, default_value_t = 1_000)]
    pub calibrate_ms: u64,

    /// Log every book event at debug level
    #[arg(long)]
    pub log_events: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 1234)),
            queue_capacity: 65_536,
            book_capacity: 1_000_000,
            feed_core: None,
            engine_core: None,
            duration_secs: None,
            calibrate_ms: 1_000,
            log_events: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.queue_capacity.is_power_of_two() {
            return Err(CapacityError {
                requested: self.queue_capacity,
            }
            .into());
        }
        let max = NULL_INDEX - 1;
        if self.book_capacity == 0 || self.book_capacity > max {
            return Err(ConfigError::BookCapacity {
                requested: self.book_capacity,
                max,
            });
        }
        if let (Some(feed), Some(engine)) = (self.feed_core, self.engine_core) {
            if feed == engine {
                return Err(ConfigError::SharedCore(feed));
            }
        }
        Ok(())
    }

    pub fn calibration_window(&self) -> Duration {
        Duration::from_millis(self.calibrate_ms)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}
