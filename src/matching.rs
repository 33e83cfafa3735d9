//! Matching Engine - Core order matching algorithm.
//!
//! Implements the cross/rest algorithm:
//! 1. CROSSING: Match aggressive orders against the opposite side
//! 2. RESTING: Place remaining quantity in the book
//!
//! Every externally visible change is reported to the engine's [`Listener`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashSet;

use crate::arena::{Arena, OrderNode};
use crate::command::{
    CancelOrder, Command, LevelUpdate, NewOrder, OrderAdded, OrderCancelled, OrderRejected, Price,
    RejectReason, Side, Trade,
};
use crate::listener::Listener;
use crate::order_book::OrderBook;

/// Levels a single submission can touch before `touched` grows
const TOUCHED_LEVELS: usize = 64;

/// Summary of an accepted submission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Execution {
    /// Quantity traded while crossing
    pub filled: u32,
    /// Quantity left resting in the book (0 if fully filled)
    pub resting: u32,
}

/// The matching engine core
pub struct MatchingEngine<L: Listener> {
    /// Memory arena for order nodes
    pub arena: Arena,
    /// The limit order book
    pub book: OrderBook,
    listener: L,
    /// Every id accepted this session; ids are never reused. Pre-sized to
    /// the arena capacity and grows (with a rehash) beyond that.
    seen_ids: FxHashSet<u64>,
    /// Time-priority counter stamped on resting orders
    next_sequence: u64,
    /// Levels touched by the submission in flight, in touch order.
    /// Reallocates only for a sweep across more than `TOUCHED_LEVELS` levels.
    touched: Vec<(Side, Price)>,
}

impl<L: Listener> MatchingEngine<L> {
    /// Create a new matching engine holding at most `capacity` resting orders
    pub fn new(capacity: u32, listener: L) -> Self {
        Self {
            arena: Arena::new(capacity),
            book: OrderBook::with_capacity(capacity as usize),
            listener,
            seen_ids: FxHashSet::with_capacity_and_hasher(capacity as usize, Default::default()),
            next_sequence: 0,
            touched: Vec::with_capacity(TOUCHED_LEVELS),
        }
    }

    /// Apply one command
    #[inline]
    pub fn process(&mut self, command: Command) {
        // Outcomes are already reported to the listener
        match command {
            Command::Submit(order) => {
                let _ = self.submit(order);
            }
            Command::Cancel(CancelOrder { order_id }) => {
                let _ = self.cancel(order_id);
            }
        }
    }

    /// Submit a limit order.
    ///
    /// # Algorithm
    /// 1. Validate quantity, id uniqueness and room to rest
    /// 2. Cross against the opposite side, best price first, FIFO within a level
    /// 3. If quantity remains, rest the order in the book
    /// 4. Publish the new aggregate of every touched level
    ///
    /// A rejection notifies the listener and leaves the book untouched.
    pub fn submit(&mut self, order: NewOrder) -> Result<Execution, RejectReason> {
        if order.qty == 0 {
            return Err(self.reject(order.order_id, RejectReason::InvalidQuantity));
        }
        if self.seen_ids.contains(&order.order_id) {
            return Err(self.reject(order.order_id, RejectReason::DuplicateOrderId));
        }
        // Only an order that cannot trade at all needs a free node up front:
        // any marketable order either fills completely or fully consumes at
        // least one maker, whose node is released before the remainder rests.
        if self.arena.is_full() && !self.is_marketable(&order) {
            return Err(self.reject(order.order_id, RejectReason::BookFull));
        }

        self.seen_ids.insert(order.order_id);
        self.touched.clear();

        // Phase 1: CROSSING
        let remaining = self.cross_order(&order);

        // Phase 2: RESTING
        if remaining > 0 {
            self.rest_order(&order, remaining);
        }

        self.publish_touched_levels();

        Ok(Execution {
            filled: order.qty - remaining,
            resting: remaining,
        })
    }

    /// Cancel a resting order, returning the quantity that was removed.
    pub fn cancel(&mut self, order_id: u64) -> Result<u32, RejectReason> {
        let info = match self.book.remove_order(&mut self.arena, order_id) {
            Some(info) => info,
            None => return Err(self.reject(order_id, RejectReason::UnknownOrderId)),
        };

        let qty = self.arena.get(info.arena_index).qty;
        self.arena.release(info.arena_index);

        self.listener.on_order_cancelled(&OrderCancelled {
            order_id,
            side: info.side,
            price: info.price,
            qty,
        });

        let (total, count) = self.book.depth_at(info.side, info.price);
        self.listener.on_order_book_update(&LevelUpdate {
            side: info.side,
            price: info.price,
            qty: total,
            count,
        });

        Ok(qty)
    }

    /// True if the best opposite level trades with `order`
    #[inline]
    fn is_marketable(&self, order: &NewOrder) -> bool {
        self.book
            .best_opposite_price(order.side)
            .is_some_and(|best| prices_cross(order.side, order.price, best))
    }

    /// Cross (match) an incoming order against the opposite side.
    ///
    /// # Returns
    /// Remaining quantity after matching
    fn cross_order(&mut self, order: &NewOrder) -> u32 {
        let maker_side = order.side.opposite();
        let mut remaining = order.qty;

        while remaining > 0 {
            let best = match self.book.best_price(maker_side) {
                Some(price) => price,
                None => break,
            };
            if !prices_cross(order.side, order.price, best) {
                break;
            }

            self.touched.push((maker_side, best));
            remaining = self.match_at_level(order, maker_side, best, remaining);
        }

        remaining
    }

    /// Match against the orders at one price level until either side is
    /// exhausted.
    fn match_at_level(
        &mut self,
        taker: &NewOrder,
        maker_side: Side,
        price: Price,
        mut remaining: u32,
    ) -> u32 {
        while remaining > 0 {
            let fill = match self.book.fill_front(&mut self.arena, maker_side, price, remaining) {
                Some(fill) => fill,
                None => break,
            };

            remaining -= fill.qty;

            // Execution at the resting price
            self.listener.on_trade(&Trade {
                aggressor_id: taker.order_id,
                resting_id: fill.maker_order_id,
                price,
                qty: fill.qty,
                aggressor_side: taker.side,
            });

            if fill.level_empty {
                break;
            }
        }

        remaining
    }

    /// Rest an order in the book (passive posting).
    fn rest_order(&mut self, order: &NewOrder, qty: u32) {
        let sequence = self.next_sequence;
        let node = OrderNode::new(order.order_id, order.side, order.price, qty, sequence);

        // `submit` guaranteed a free node or a maker released during crossing
        let Some(arena_idx) = self.arena.alloc(node) else {
            debug_assert!(false, "arena exhausted after capacity check");
            return;
        };
        self.next_sequence += 1;
        self.book.add_order(&mut self.arena, arena_idx);

        self.listener.on_order_added(&OrderAdded {
            order_id: order.order_id,
            side: order.side,
            price: order.price,
            qty,
        });
        self.touched.push((order.side, order.price));
    }

    fn publish_touched_levels(&mut self) {
        for &(side, price) in &self.touched {
            let (qty, count) = self.book.depth_at(side, price);
            self.listener
                .on_order_book_update(&LevelUpdate { side, price, qty, count });
        }
    }

    fn reject(&mut self, order_id: u64, reason: RejectReason) -> RejectReason {
        self.listener
            .on_order_rejected(&OrderRejected { order_id, reason });
        reason
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.book.best_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<Price> {
        self.book.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Resting order by id
    pub fn order(&self, order_id: u64) -> Option<&OrderNode> {
        self.book
            .get_order(order_id)
            .map(|info| self.arena.get(info.arena_index))
    }

    /// Order ids resting at one level, oldest first
    pub fn level_order_ids(&self, side: Side, price: Price) -> Vec<u64> {
        self.book
            .get_level(side, price)
            .map(|level| level.iter(&self.arena).map(|n| n.order_id).collect())
            .unwrap_or_default()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    /// Warm up the engine (pre-fault memory pages)
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    /// Hash of the full resting state, in priority order (determinism tests)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for side in [Side::Buy, Side::Sell] {
            side.hash(&mut hasher);
            for (price, level) in self.book.levels(side) {
                price.hash(&mut hasher);
                for node in level.iter(&self.arena) {
                    node.order_id.hash(&mut hasher);
                    node.qty.hash(&mut hasher);
                }
            }
        }
        self.book.order_count().hash(&mut hasher);
        self.arena.len().hash(&mut hasher);

        hasher.finish()
    }
}

/// Check if an incoming order price crosses the opposite best price.
#[inline]
fn prices_cross(order_side: Side, order_price: Price, opposite_best: Price) -> bool {
    match order_side {
        // Buyer willing to pay >= lowest ask
        Side::Buy => order_price >= opposite_best,
        // Seller willing to accept <= highest bid
        Side::Sell => order_price <= opposite_best,
    }
}
