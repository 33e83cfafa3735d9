//! Fuzz Test - Compares the matching engine against a reference implementation.
//!
//! Uses a naive but correct reference book to verify the arena-backed engine
//! produces identical trades and book state.

use flash_feed::{
    BookEvent, EventRecorder, MatchingEngine, MetricsListener, NewOrder, Price, RejectReason, Side,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};

/// (resting_id, price, qty) per fill, in execution order
type Fills = Vec<(u64, Price, u32)>;

/// Simple reference implementation for verification
#[derive(Default)]
struct ReferenceBook {
    bids: BTreeMap<Price, Vec<(u64, u32)>>, // price -> [(order_id, qty)]
    asks: BTreeMap<Price, Vec<(u64, u32)>>,
    orders: HashMap<u64, (Side, Price)>, // order_id -> (side, price)
}

impl ReferenceBook {
    fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    fn submit(&mut self, order_id: u64, side: Side, price: Price, mut qty: u32) -> Fills {
        let mut fills = Vec::new();

        loop {
            if qty == 0 {
                break;
            }
            let best = match side {
                Side::Buy => self.best_ask().filter(|&p| p <= price),
                Side::Sell => self.best_bid().filter(|&p| p >= price),
            };
            let Some(level_price) = best else { break };

            let book = match side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let orders = book.get_mut(&level_price).unwrap();
            while !orders.is_empty() && qty > 0 {
                let trade_qty = orders[0].1.min(qty);
                orders[0].1 -= trade_qty;
                qty -= trade_qty;
                fills.push((orders[0].0, level_price, trade_qty));

                if orders[0].1 == 0 {
                    let (maker_id, _) = orders.remove(0);
                    self.orders.remove(&maker_id);
                }
            }
            if orders.is_empty() {
                book.remove(&level_price);
            }
        }

        // Rest
        if qty > 0 {
            let book = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            book.entry(price).or_default().push((order_id, qty));
            self.orders.insert(order_id, (side, price));
        }

        fills
    }

    fn cancel(&mut self, order_id: u64) -> bool {
        let Some((side, price)) = self.orders.remove(&order_id) else {
            return false;
        };
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(orders) = book.get_mut(&price) {
            orders.retain(|(id, _)| *id != order_id);
            if orders.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    fn depth_at(&self, side: Side, price: Price) -> u64 {
        let book = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book.get(&price)
            .map(|v| v.iter().map(|(_, q)| u64::from(*q)).sum())
            .unwrap_or(0)
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

fn generate_order(rng: &mut ChaCha8Rng, order_id: u64) -> NewOrder {
    NewOrder {
        order_id,
        side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
        price: rng.gen_range(9800..10200),
        qty: rng.gen_range(1..200),
    }
}

fn engine_fills(events: &[BookEvent]) -> Fills {
    events
        .iter()
        .filter_map(|e| match e {
            BookEvent::Trade(t) => Some((t.resting_id, t.price, t.qty)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_fuzz_best_prices() {
    const SEED: u64 = 0xFEEDFACE;
    const OPS: usize = 10_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = MatchingEngine::new(100_000, MetricsListener::new());
    let mut reference = ReferenceBook::default();

    let mut next_order_id = 1u64;
    let mut active_orders: Vec<u64> = Vec::new();

    for i in 0..OPS {
        // 70% submit, 30% cancel
        if active_orders.is_empty() || rng.gen_bool(0.7) {
            let order = generate_order(&mut rng, next_order_id);
            next_order_id += 1;

            let _ = engine.submit(order);
            reference.submit(order.order_id, order.side, order.price, order.qty);

            active_orders.push(order.order_id);
        } else {
            let idx = rng.gen_range(0..active_orders.len());
            let order_id = active_orders.swap_remove(idx);

            let engine_ok = engine.cancel(order_id).is_ok();
            let reference_ok = reference.cancel(order_id);
            assert_eq!(engine_ok, reference_ok, "Cancel outcome mismatch at op {}", i);
        }

        assert_eq!(engine.best_bid(), reference.best_bid(), "Best bid mismatch at op {}", i);
        assert_eq!(engine.best_ask(), reference.best_ask(), "Best ask mismatch at op {}", i);
    }

    engine.book.assert_invariants(&engine.arena);
}

#[test]
fn test_fuzz_fills_match_reference() {
    const SEED: u64 = 0xBADC0DE;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = MatchingEngine::new(100_000, EventRecorder::new());
    let mut reference = ReferenceBook::default();

    let mut next_order_id = 1u64;
    let mut active_orders: Vec<u64> = Vec::new();

    for i in 0..OPS {
        if active_orders.is_empty() || rng.gen_bool(0.6) {
            let order = generate_order(&mut rng, next_order_id);
            next_order_id += 1;

            let exec = engine.submit(order).expect("valid order");
            let events = engine.listener_mut().drain();
            let expected = reference.submit(order.order_id, order.side, order.price, order.qty);

            assert_eq!(engine_fills(&events), expected, "Fill mismatch at op {}", i);
            if exec.resting > 0 {
                active_orders.push(order.order_id);
                assert_eq!(
                    engine.book.depth_at(order.side, order.price).0,
                    reference.depth_at(order.side, order.price)
                );
            }
        } else {
            let idx = rng.gen_range(0..active_orders.len());
            let order_id = active_orders.swap_remove(idx);

            // May have been filled since it rested
            let engine_ok = engine.cancel(order_id).is_ok();
            engine.listener_mut().drain();
            assert_eq!(engine_ok, reference.cancel(order_id));
        }

        if i % 100 == 0 {
            assert_eq!(
                engine.order_count(),
                reference.order_count(),
                "Order count mismatch at op {}",
                i
            );
            engine.book.assert_invariants(&engine.arena);
        }
    }

    assert_eq!(engine.order_count(), reference.order_count());
}

#[test]
fn test_fuzz_trade_volume() {
    const SEED: u64 = 0x12345678;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = MatchingEngine::new(100_000, MetricsListener::new());
    let mut reference = ReferenceBook::default();

    let mut reference_traded = 0u64;

    for i in 0..OPS {
        let order = generate_order(&mut rng, i as u64 + 1);

        let _ = engine.submit(order);
        let fills = reference.submit(order.order_id, order.side, order.price, order.qty);
        reference_traded += fills.iter().map(|f| u64::from(f.2)).sum::<u64>();
    }

    assert_eq!(engine.listener().traded_qty, reference_traded);
    assert_eq!(engine.listener().total_rejects(), 0);
}

#[test]
fn test_fuzz_random_rejects_leave_no_trace() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut engine = MatchingEngine::new(10_000, MetricsListener::new());

    for id in 1..=2_000u64 {
        let _ = engine.submit(generate_order(&mut rng, id));

        let before = engine.state_hash();
        let used_id = rng.gen_range(1..=id);
        let dup = generate_order(&mut rng, used_id);
        assert_eq!(engine.submit(dup), Err(RejectReason::DuplicateOrderId));
        let zero = NewOrder { qty: 0, ..generate_order(&mut rng, 1_000_000 + id) };
        assert_eq!(engine.submit(zero), Err(RejectReason::InvalidQuantity));
        assert_eq!(engine.cancel(5_000_000 + id), Err(RejectReason::UnknownOrderId));
        assert_eq!(engine.state_hash(), before);
    }
}
