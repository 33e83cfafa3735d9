//! Notification listeners.
//!
//! The matching engine is generic over a [`Listener`] and calls it
//! synchronously, on the mutating thread, for every externally visible
//! change. Dispatch is static, so a notification costs one inlined call and
//! no allocation.
//!
//! A listener must not call back into the book it is observing.

use tracing::{debug, info, warn};

use crate::command::{
    BookEvent, LevelUpdate, OrderAdded, OrderCancelled, OrderRejected, RejectReason, Trade,
};

/// Observer of order book state changes.
///
/// For `submit`, the call order is: every `on_trade` in execution order, then
/// `on_order_added` if a remainder rests, then one `on_order_book_update` per
/// touched level. For `cancel`: `on_order_cancelled` then
/// `on_order_book_update`. Rejections produce only `on_order_rejected`.
pub trait Listener {
    fn on_trade(&mut self, trade: &Trade);

    fn on_order_added(&mut self, added: &OrderAdded);

    fn on_order_cancelled(&mut self, cancelled: &OrderCancelled);

    fn on_order_rejected(&mut self, rejected: &OrderRejected);

    fn on_order_book_update(&mut self, update: &LevelUpdate);
}

impl<L: Listener + ?Sized> Listener for &mut L {
    #[inline]
    fn on_trade(&mut self, trade: &Trade) {
        (**self).on_trade(trade)
    }
    #[inline]
    fn on_order_added(&mut self, added: &OrderAdded) {
        (**self).on_order_added(added)
    }
    #[inline]
    fn on_order_cancelled(&mut self, cancelled: &OrderCancelled) {
        (**self).on_order_cancelled(cancelled)
    }
    #[inline]
    fn on_order_rejected(&mut self, rejected: &OrderRejected) {
        (**self).on_order_rejected(rejected)
    }
    #[inline]
    fn on_order_book_update(&mut self, update: &LevelUpdate) {
        (**self).on_order_book_update(update)
    }
}

/// Fan-out: both listeners see every event, `A` first.
impl<A: Listener, B: Listener> Listener for (A, B) {
    #[inline]
    fn on_trade(&mut self, trade: &Trade) {
        self.0.on_trade(trade);
        self.1.on_trade(trade);
    }
    #[inline]
    fn on_order_added(&mut self, added: &OrderAdded) {
        self.0.on_order_added(added);
        self.1.on_order_added(added);
    }
    #[inline]
    fn on_order_cancelled(&mut self, cancelled: &OrderCancelled) {
        self.0.on_order_cancelled(cancelled);
        self.1.on_order_cancelled(cancelled);
    }
    #[inline]
    fn on_order_rejected(&mut self, rejected: &OrderRejected) {
        self.0.on_order_rejected(rejected);
        self.1.on_order_rejected(rejected);
    }
    #[inline]
    fn on_order_book_update(&mut self, update: &LevelUpdate) {
        self.0.on_order_book_update(update);
        self.1.on_order_book_update(update);
    }
}

impl BookEvent {
    /// Replay this event into a listener.
    #[inline]
    pub fn notify<L: Listener + ?Sized>(&self, listener: &mut L) {
        match self {
            BookEvent::Trade(t) => listener.on_trade(t),
            BookEvent::Added(a) => listener.on_order_added(a),
            BookEvent::Cancelled(c) => listener.on_order_cancelled(c),
            BookEvent::Rejected(r) => listener.on_order_rejected(r),
            BookEvent::Level(u) => listener.on_order_book_update(u),
        }
    }
}

/// Discards everything. Used by benchmarks and the bare engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl Listener for NoopListener {
    #[inline(always)]
    fn on_trade(&mut self, _: &Trade) {}
    #[inline(always)]
    fn on_order_added(&mut self, _: &OrderAdded) {}
    #[inline(always)]
    fn on_order_cancelled(&mut self, _: &OrderCancelled) {}
    #[inline(always)]
    fn on_order_rejected(&mut self, _: &OrderRejected) {}
    #[inline(always)]
    fn on_order_book_update(&mut self, _: &LevelUpdate) {}
}

/// Emits a `tracing` event per notification.
///
/// Trades log at `info`, rejects at `warn`, everything else at `debug`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingListener;

impl Listener for LoggingListener {
    fn on_trade(&mut self, t: &Trade) {
        info!(
            aggressor = t.aggressor_id,
            resting = t.resting_id,
            price = t.price,
            qty = t.qty,
            side = ?t.aggressor_side,
            "trade"
        );
    }

    fn on_order_added(&mut self, a: &OrderAdded) {
        debug!(order_id = a.order_id, side = ?a.side, price = a.price, qty = a.qty, "order added");
    }

    fn on_order_cancelled(&mut self, c: &OrderCancelled) {
        debug!(
            order_id = c.order_id,
            side = ?c.side,
            price = c.price,
            qty = c.qty,
            "order cancelled"
        );
    }

    fn on_order_rejected(&mut self, r: &OrderRejected) {
        warn!(order_id = r.order_id, reason = ?r.reason, "order rejected");
    }

    fn on_order_book_update(&mut self, u: &LevelUpdate) {
        debug!(side = ?u.side, price = u.price, qty = u.qty, count = u.count, "level update");
    }
}

/// Plain counters; lives on the matching thread so no atomics are needed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsListener {
    pub trades: u64,
    pub traded_qty: u64,
    pub orders_added: u64,
    pub orders_cancelled: u64,
    pub cancelled_qty: u64,
    pub level_updates: u64,
    rejects: [u64; RejectReason::ALL.len()],
}

impl MetricsListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejections seen for one reason
    pub fn rejects(&self, reason: RejectReason) -> u64 {
        self.rejects[reason as usize]
    }

    pub fn total_rejects(&self) -> u64 {
        self.rejects.iter().sum()
    }
}

impl Listener for MetricsListener {
    #[inline]
    fn on_trade(&mut self, t: &Trade) {
        self.trades += 1;
        self.traded_qty += u64::from(t.qty);
    }
    #[inline]
    fn on_order_added(&mut self, _: &OrderAdded) {
        self.orders_added += 1;
    }
    #[inline]
    fn on_order_cancelled(&mut self, c: &OrderCancelled) {
        self.orders_cancelled += 1;
        self.cancelled_qty += u64::from(c.qty);
    }
    #[inline]
    fn on_order_rejected(&mut self, r: &OrderRejected) {
        self.rejects[r.reason as usize] += 1;
    }
    #[inline]
    fn on_order_book_update(&mut self, _: &LevelUpdate) {
        self.level_updates += 1;
    }
}

/// Records every notification in call order.
#[derive(Clone, Debug, Default)]
pub struct EventRecorder {
    pub events: Vec<BookEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the recorded events, leaving the recorder empty
    pub fn drain(&mut self) -> Vec<BookEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> + '_ {
        self.events.iter().filter_map(|e| match e {
            BookEvent::Trade(t) => Some(t),
            _ => None,
        })
    }

    pub fn level_updates(&self) -> impl Iterator<Item = &LevelUpdate> + '_ {
        self.events.iter().filter_map(|e| match e {
            BookEvent::Level(u) => Some(u),
            _ => None,
        })
    }
}

impl Listener for EventRecorder {
    fn on_trade(&mut self, t: &Trade) {
        self.events.push(BookEvent::Trade(*t));
    }
    fn on_order_added(&mut self, a: &OrderAdded) {
        self.events.push(BookEvent::Added(*a));
    }
    fn on_order_cancelled(&mut self, c: &OrderCancelled) {
        self.events.push(BookEvent::Cancelled(*c));
    }
    fn on_order_rejected(&mut self, r: &OrderRejected) {
        self.events.push(BookEvent::Rejected(*r));
    }
    fn on_order_book_update(&mut self, u: &LevelUpdate) {
        self.events.push(BookEvent::Level(*u));
    }
}

/// Forwards events to another thread over an `rtrb` ring.
///
/// Never blocks: when the ring is full the event is dropped and counted.
#[cfg(feature = "runtime")]
pub struct ChannelListener {
    output: rtrb::Producer<BookEvent>,
    dropped: u64,
}

#[cfg(feature = "runtime")]
impl ChannelListener {
    pub fn new(output: rtrb::Producer<BookEvent>) -> Self {
        Self { output, dropped: 0 }
    }

    /// Events lost to a full ring
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[inline]
    fn forward(&mut self, event: BookEvent) {
        // Best effort - drop if full
        if self.output.push(event).is_err() {
            self.dropped += 1;
        }
    }
}

#[cfg(feature = "runtime")]
impl Listener for ChannelListener {
    #[inline]
    fn on_trade(&mut self, t: &Trade) {
        self.forward(BookEvent::Trade(*t));
    }
    #[inline]
    fn on_order_added(&mut self, a: &OrderAdded) {
        self.forward(BookEvent::Added(*a));
    }
    #[inline]
    fn on_order_cancelled(&mut self, c: &OrderCancelled) {
        self.forward(BookEvent::Cancelled(*c));
    }
    #[inline]
    fn on_order_rejected(&mut self, r: &OrderRejected) {
        self.forward(BookEvent::Rejected(*r));
    }
    #[inline]
    fn on_order_book_update(&mut self, u: &LevelUpdate) {
        self.forward(BookEvent::Level(*u));
    }
}
