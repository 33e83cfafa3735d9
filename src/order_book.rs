//! Order Book - The central limit order book data structure.
//!
//! Bids and asks are price-ordered maps of FIFO price levels. An id index
//! gives O(1) lookup for cancellation. The book only manages structure;
//! the crossing algorithm lives in [`crate::matching`].

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex};
use crate::command::{Price, Side};
use crate::price_level::PriceLevel;

/// Where a resting order lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    /// Index in the arena
    pub arena_index: ArenaIndex,
    /// Book side (to find the right map on cancel)
    pub side: Side,
    /// Price level key
    pub price: Price,
}

/// Outcome of filling against the head of a level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrontFill {
    /// Resting order that traded
    pub maker_order_id: u64,
    /// Quantity executed
    pub qty: u32,
    /// Maker was fully filled and left the book
    pub maker_done: bool,
    /// The level was emptied and pruned
    pub level_empty: bool,
}

/// Price-ordered limit order book.
///
/// `bids` iterate best-last (highest price is the last key), `asks`
/// best-first. Within a level, FIFO position is time priority.
#[derive(Default)]
pub struct OrderBook {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    /// Order lookup map: OrderId -> OrderInfo
    order_map: FxHashMap<u64, OrderInfo>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a book whose id index is pre-sized for `orders` entries
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_map: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    #[inline]
    fn side_map(&self, side: Side) -> &BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Highest resting buy price
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(p, _)| *p)
    }

    /// Lowest resting sell price
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Best price an incoming order on `side` would trade against
    #[inline]
    pub fn best_opposite_price(&self, side: Side) -> Option<Price> {
        self.best_price(side.opposite())
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    pub fn get_level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        self.side_map(side).get(&price)
    }

    /// Levels of one side from best to worst
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = (Price, &PriceLevel)> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.iter().rev().map(|(p, l)| (*p, l))),
            Side::Sell => Box::new(self.asks.iter().map(|(p, l)| (*p, l))),
        }
    }

    /// Top `n` levels of one side as `(price, total_qty)`, best first
    pub fn depth(&self, side: Side, n: usize) -> Vec<(Price, u64)> {
        self.levels(side).take(n).map(|(p, l)| (p, l.total_qty)).collect()
    }

    /// Aggregate `(total_qty, order_count)` at a price, zero if absent
    pub fn depth_at(&self, side: Side, price: Price) -> (u64, u32) {
        self.get_level(side, price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((0, 0))
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Rest an allocated node at the tail of its level and index it.
    ///
    /// # Returns
    /// `false` (and no change) if the order id is already resting.
    pub fn add_order(&mut self, arena: &mut Arena, arena_index: ArenaIndex) -> bool {
        let node = arena.get(arena_index);
        let (order_id, side, price) = (node.order_id, node.side, node.price);

        if self.order_map.contains_key(&order_id) {
            return false;
        }

        self.order_map.insert(order_id, OrderInfo { arena_index, side, price });
        self.side_map_mut(side)
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .push_back(arena, arena_index);

        true
    }

    /// Unlink an order from its level and the index (for cancel).
    ///
    /// Empty levels are pruned. The node is NOT freed; the caller reads
    /// what it needs and then frees it.
    pub fn remove_order(&mut self, arena: &mut Arena, order_id: u64) -> Option<OrderInfo> {
        let info = self.order_map.remove(&order_id)?;
        let map = self.side_map_mut(info.side);

        if let Some(level) = map.get_mut(&info.price) {
            if level.remove(arena, info.arena_index) {
                map.remove(&info.price);
            }
        }

        Some(info)
    }

    /// Trade up to `max_qty` against the oldest order at `price` on `side`.
    ///
    /// A fully filled maker is unlinked, unindexed and freed; an emptied
    /// level is pruned. Returns `None` if the level does not exist.
    pub fn fill_front(
        &mut self,
        arena: &mut Arena,
        side: Side,
        price: Price,
        max_qty: u32,
    ) -> Option<FrontFill> {
        let map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = map.get_mut(&price)?;

        let head = level.front()?;

        let maker = arena.get_mut(head);
        let maker_order_id = maker.order_id;
        let qty = max_qty.min(maker.qty);
        maker.qty -= qty;
        let maker_done = maker.qty == 0;
        level.reduce(qty);

        if maker_done {
            level.pop_front(arena);
            self.order_map.remove(&maker_order_id);
            arena.release(head);
        }

        let level_empty = level.is_empty();
        if level_empty {
            map.remove(&price);
        }

        Some(FrontFill {
            maker_order_id,
            qty,
            maker_done,
            level_empty,
        })
    }

    #[inline]
    pub fn get_order(&self, order_id: u64) -> Option<&OrderInfo> {
        self.order_map.get(&order_id)
    }

    #[inline]
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.order_map.contains_key(&order_id)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    pub fn order_count(&self) -> usize {
        self.order_map.len()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_map.is_empty()
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Panics if any structural invariant is broken.
    ///
    /// Checks: book not crossed, no empty level, level aggregates match their
    /// orders, every indexed id points at a live node in the right level, and
    /// the index covers every resting order.
    pub fn assert_invariants(&self, arena: &Arena) {
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "book crossed: bid {} >= ask {}", bid, ask);
        }

        let mut resting = 0usize;
        for side in [Side::Buy, Side::Sell] {
            for (price, level) in self.levels(side) {
                assert!(!level.is_empty(), "empty level left at {:?} {}", side, price);

                let mut qty = 0u64;
                let mut count = 0u32;
                let mut last_sequence = None;
                for node in level.iter(arena) {
                    assert!(node.qty > 0, "zero-qty order {} resting", node.order_id);
                    assert_eq!(node.price, price);
                    assert_eq!(node.side, side);
                    assert!(
                        self.order_map.contains_key(&node.order_id),
                        "order {} missing from index",
                        node.order_id
                    );
                    if let Some(prev) = last_sequence {
                        assert!(node.sequence > prev, "time priority broken at {}", price);
                    }
                    last_sequence = Some(node.sequence);
                    qty += u64::from(node.qty);
                    count += 1;
                }
                assert_eq!(qty, level.total_qty, "level {} qty mismatch", price);
                assert_eq!(count, level.count, "level {} count mismatch", price);
                resting += count as usize;
            }
        }
        assert_eq!(resting, self.order_map.len(), "index size != resting orders");
        assert_eq!(resting, arena.len() as usize, "arena leak");

        for (&order_id, info) in &self.order_map {
            let node = arena.get(info.arena_index);
            assert_eq!(node.order_id, order_id);
            assert_eq!(node.price, info.price);
            assert_eq!(node.side, info.side);
        }
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.order_map.len())
            .finish()
    }
}
