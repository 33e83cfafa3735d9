//! # Flash-Feed
//!
//! A low-latency market-data pipeline: UDP feed decoding, a lock-free
//! transport queue, and a deterministic price-time limit order book.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread owns the order book exclusively (no locks)
//! - **Wait-Free Handoff**: SPSC queue with acquire/release counters only
//! - **Zero-Copy**: Datagrams decode straight into claimed queue slots
//! - **Cache-Optimized**: 64-byte aligned nodes and counters, 32-bit indices
//! - **Arena Allocation**: Resting orders live in a pre-allocated node pool.
//!   The only growth while matching is the session's used-id set (amortised
//!   rehash past the pre-sized capacity) and the touched-level list of a
//!   sweep deeper than 64 levels
//!
//! ## Architecture
//!
//! ```text
//! [UDP] --> [Feed Thread] --> [SPSC Queue] --> [Engine Thread (Pinned)]
//!            decode, stamp     drop on full     sequence monitor
//!                                                      |
//!                                               [Order Book] --> [Listener]
//! ```

pub mod arena;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod feed;
pub mod listener;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod queue;
pub mod report;
pub mod sequence;
#[cfg(feature = "sim")]
pub mod sim;
pub mod wire;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use clock::{Clock, MonotonicClock, TscClock};
pub use command::{
    BookEvent, CancelOrder, Command, LevelUpdate, MsgType, NewOrder, OrderAdded, OrderCancelled,
    OrderRejected, Price, QueueItem, RejectReason, Side, Trade,
};
pub use config::{ConfigError, PipelineConfig};
pub use engine::Engine;
pub use feed::{FeedHandler, FeedStats};
pub use listener::{EventRecorder, Listener, LoggingListener, MetricsListener, NoopListener};
pub use matching::{Execution, MatchingEngine};
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use queue::{Consumer, Producer, SpscQueue};
pub use sequence::SequenceMonitor;
pub use wire::DecodeError;

#[cfg(feature = "runtime")]
pub use listener::ChannelListener;
