//! Stress Tests - Push the engine to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Near-capacity operation
//! - High contention at single price levels
//! - Rapid order churn
//! - Extreme values for prices and quantities

use flash_feed::{
    BookEvent, Command, EventRecorder, Execution, MatchingEngine, MetricsListener, NewOrder, Price,
    RejectReason, Side,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn order(order_id: u64, side: Side, price: Price, qty: u32) -> NewOrder {
    NewOrder { order_id, side, price, qty }
}

fn metrics_engine(capacity: u32) -> MatchingEngine<MetricsListener> {
    MatchingEngine::new(capacity, MetricsListener::new())
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_near_capacity_operation() {
    const CAPACITY: u32 = 10_000;
    let mut engine = metrics_engine(CAPACITY);

    // Fill to 95% capacity
    let target_orders = (CAPACITY as f64 * 0.95) as u64;

    for i in 0..target_orders {
        // Use non-overlapping prices: bids 8000-8990, asks 10000-10990
        let (side, price) = if i % 2 == 0 {
            (Side::Buy, 8000 + (i % 100) as Price * 10)
        } else {
            (Side::Sell, 10000 + (i % 100) as Price * 10)
        };

        let exec = engine.submit(order(i, side, price, 100));
        assert_eq!(exec, Ok(Execution { filled: 0, resting: 100 }), "Order {} should rest", i);
    }

    assert_eq!(engine.order_count(), target_orders as usize);
    engine.book.assert_invariants(&engine.arena);
}

#[test]
fn test_arena_full_rejection() {
    const CAPACITY: u32 = 100;
    let mut engine = metrics_engine(CAPACITY);

    for i in 0..CAPACITY as u64 {
        engine.submit(order(i, Side::Buy, 9000 + i as Price * 10, 100)).unwrap();
    }

    // Nothing to trade against and nowhere to rest
    let result = engine.submit(order(CAPACITY as u64, Side::Sell, 20_000, 100));

    assert_eq!(result, Err(RejectReason::BookFull));
    assert_eq!(engine.listener().rejects(RejectReason::BookFull), 1);
    assert_eq!(engine.listener().trades, 0);

    // A marketable order needs no node of its own
    let sweep = engine.submit(order(CAPACITY as u64 + 1, Side::Sell, 1, 250)).unwrap();
    assert_eq!(sweep.filled, 250);
    assert_eq!(sweep.resting, 0);
    assert_eq!(engine.listener().trades, 3);
    assert_eq!(engine.order_count(), CAPACITY as usize - 2);
    engine.book.assert_invariants(&engine.arena);
}

#[test]
fn test_arena_reuse_after_cancel() {
    const CAPACITY: u32 = 100;
    let mut engine = metrics_engine(CAPACITY);

    for i in 0..CAPACITY as u64 {
        engine.submit(order(i, Side::Buy, 9000, 100)).unwrap();
    }

    engine.cancel(50).unwrap();

    assert!(
        engine.submit(order(1000, Side::Buy, 9000, 100)).is_ok(),
        "Should be able to add order after cancel frees slot"
    );
    assert_eq!(engine.submit(order(1001, Side::Buy, 9000, 100)), Err(RejectReason::BookFull));
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let mut engine = MatchingEngine::new(10_000, EventRecorder::new());
    const ORDERS_PER_SIDE: u64 = 1000;

    for i in 0..ORDERS_PER_SIDE {
        engine.submit(order(i, Side::Sell, 10000, 100)).unwrap();
    }
    assert_eq!(engine.order_count(), ORDERS_PER_SIDE as usize);
    assert_eq!(engine.book.depth_at(Side::Sell, 10000), (ORDERS_PER_SIDE * 100, 1000));
    engine.listener_mut().drain();

    // Match through all of them
    let exec = engine
        .submit(order(ORDERS_PER_SIDE, Side::Buy, 10000, (ORDERS_PER_SIDE * 100) as u32))
        .unwrap();

    assert_eq!(exec.resting, 0);
    assert_eq!(engine.listener().trades().count(), ORDERS_PER_SIDE as usize);
    // One level touched, one update
    assert_eq!(engine.listener().level_updates().count(), 1);
    assert_eq!(engine.order_count(), 0, "Book should be empty after matching all");
    assert!(engine.arena.is_empty());
}

#[test]
fn test_fifo_priority_under_contention() {
    let mut engine = MatchingEngine::new(1000, EventRecorder::new());

    for i in 0..100u64 {
        engine.submit(order(i, Side::Sell, 10000, 10)).unwrap();
    }
    engine.listener_mut().drain();

    // 50 orders @ 10 qty each
    engine.submit(order(1000, Side::Buy, 10000, 500)).unwrap();

    let makers: Vec<_> = engine.listener().trades().map(|t| t.resting_id).collect();
    assert_eq!(makers.len(), 50);
    for (i, &maker_id) in makers.iter().enumerate() {
        assert_eq!(maker_id, i as u64, "Trade {} should match order {}", i, i);
    }
    assert_eq!(engine.level_order_ids(Side::Sell, 10000)[0], 50);
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let mut engine = metrics_engine(16);
    const CYCLES: u64 = 10_000;

    for order_id in 0..CYCLES {
        engine.submit(order(order_id, Side::Buy, 10000, 100)).unwrap();
        assert_eq!(engine.cancel(order_id), Ok(100));
    }

    assert_eq!(engine.order_count(), 0);
    assert!(engine.arena.is_empty());
    assert_eq!(engine.listener().orders_cancelled, CYCLES);
}

#[test]
fn test_rapid_match_cycles() {
    let mut engine = metrics_engine(16);
    const CYCLES: u64 = 10_000;

    for cycle in 0..CYCLES {
        let maker = cycle * 2;
        let taker = maker + 1;
        engine.submit(order(maker, Side::Sell, 10000, 100)).unwrap();
        let exec = engine.submit(order(taker, Side::Buy, 10000, 100)).unwrap();
        assert_eq!(exec.filled, 100);
    }

    assert_eq!(engine.order_count(), 0);
    assert_eq!(engine.listener().trades, CYCLES);
    assert_eq!(engine.listener().traded_qty, CYCLES * 100);
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_zero_and_negative_prices() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Buy, 0, 10)).unwrap();
    engine.submit(order(2, Side::Buy, -50, 10)).unwrap();
    engine.submit(order(3, Side::Sell, 5, 10)).unwrap();

    assert_eq!(engine.best_bid(), Some(0));
    assert_eq!(engine.spread(), Some(5));

    // Sell at -100 sweeps both bids at their own prices
    let mut engine_rec = MatchingEngine::new(100, EventRecorder::new());
    engine_rec.submit(order(1, Side::Buy, 0, 10)).unwrap();
    engine_rec.submit(order(2, Side::Buy, -50, 10)).unwrap();
    engine_rec.submit(order(3, Side::Sell, -100, 25)).unwrap();

    let prices: Vec<_> = engine_rec.listener().trades().map(|t| t.price).collect();
    assert_eq!(prices, vec![0, -50]);
    assert_eq!(engine_rec.best_ask(), Some(-100));
}

#[test]
fn test_extreme_wire_prices() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Sell, i32::MAX as Price, 1)).unwrap();
    engine.submit(order(2, Side::Buy, i32::MIN as Price, 1)).unwrap();

    assert_eq!(engine.best_ask(), Some(i32::MAX as Price));
    assert_eq!(engine.best_bid(), Some(i32::MIN as Price));
    assert_eq!(engine.spread(), Some(i32::MAX as Price - i32::MIN as Price));
}

#[test]
fn test_max_quantity() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Sell, 100, u32::MAX)).unwrap();
    engine.submit(order(2, Side::Sell, 100, u32::MAX)).unwrap();

    // Level totals are u64 and do not overflow
    assert_eq!(engine.book.depth_at(Side::Sell, 100), (2 * u64::from(u32::MAX), 2));

    let exec = engine.submit(order(3, Side::Buy, 100, u32::MAX)).unwrap();
    assert_eq!(exec.filled, u32::MAX);
    assert_eq!(engine.order_count(), 1);
}

#[test]
fn test_quantity_one() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Sell, 10000, 1)).unwrap();
    let exec = engine.submit(order(2, Side::Buy, 10000, 1)).unwrap();

    assert_eq!(exec, Execution { filled: 1, resting: 0 });
    assert_eq!(engine.order_count(), 0);
}

#[test]
fn test_many_price_levels() {
    let mut engine = metrics_engine(10_000);

    for i in 0..1000u64 {
        engine.submit(order(i, Side::Buy, 5000 + i as Price, 10)).unwrap();
    }

    assert_eq!(engine.book.bid_levels(), 1000);
    assert_eq!(engine.best_bid(), Some(5999));

    let top = engine.book.depth(Side::Buy, 3);
    assert_eq!(top, vec![(5999, 10), (5998, 10), (5997, 10)]);
}

// ============================================================================
// Cancel Edge Cases
// ============================================================================

#[test]
fn test_double_cancel() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Buy, 10000, 100)).unwrap();

    assert_eq!(engine.cancel(1), Ok(100));
    assert_eq!(engine.cancel(1), Err(RejectReason::UnknownOrderId));
    assert_eq!(engine.listener().rejects(RejectReason::UnknownOrderId), 1);
}

#[test]
fn test_cancel_after_partial_fill() {
    let mut engine = MatchingEngine::new(100, EventRecorder::new());

    engine.submit(order(1, Side::Sell, 10000, 100)).unwrap();
    engine.submit(order(2, Side::Buy, 10000, 30)).unwrap();
    engine.listener_mut().drain();

    // Only the remainder is cancelled
    assert_eq!(engine.cancel(1), Ok(70));
    let events = engine.listener_mut().drain();
    assert!(matches!(events[0], BookEvent::Cancelled(c) if c.qty == 70));
}

#[test]
fn test_cancel_filled_order_rejects() {
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Sell, 100, 10)).unwrap();
    engine.submit(order(2, Side::Buy, 100, 10)).unwrap();

    assert_eq!(engine.cancel(1), Err(RejectReason::UnknownOrderId));
    assert_eq!(engine.cancel(2), Err(RejectReason::UnknownOrderId));
}

// ============================================================================
// Matching Edge Cases
// ============================================================================

#[test]
fn test_partial_match_across_levels() {
    let mut engine = MatchingEngine::new(100, EventRecorder::new());

    engine.submit(order(1, Side::Sell, 100, 10)).unwrap();
    engine.submit(order(2, Side::Sell, 101, 10)).unwrap();
    engine.submit(order(3, Side::Sell, 102, 10)).unwrap();
    engine.listener_mut().drain();

    let exec = engine.submit(order(4, Side::Buy, 101, 25)).unwrap();

    assert_eq!(exec, Execution { filled: 20, resting: 5 });
    assert_eq!(engine.best_bid(), Some(101));
    assert_eq!(engine.best_ask(), Some(102));

    let events = engine.listener_mut().drain();
    let tail: Vec<_> = events.iter().skip(2).copied().collect();
    assert!(matches!(tail[0], BookEvent::Added(a) if a.order_id == 4 && a.qty == 5));
    let levels: Vec<_> = tail[1..]
        .iter()
        .filter_map(|e| match e {
            BookEvent::Level(u) => Some((u.side, u.price, u.qty)),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![(Side::Sell, 100, 0), (Side::Sell, 101, 0), (Side::Buy, 101, 5)]);
}

#[test]
fn test_same_participant_orders_trade() {
    // No participant identity: crossing orders always trade
    let mut engine = metrics_engine(100);

    engine.submit(order(1, Side::Buy, 100, 10)).unwrap();
    engine.submit(order(2, Side::Sell, 100, 10)).unwrap();

    assert_eq!(engine.listener().trades, 1);
}

// ============================================================================
// Large Scale Fuzzing
// ============================================================================

#[test]
fn test_large_random_workload() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    let mut engine = metrics_engine(200_000);
    let mut next_id = 1u64;
    let mut ids: Vec<u64> = Vec::new();

    for step in 0..200_000u64 {
        let roll: f64 = rng.gen();
        let cmd = if roll < 0.6 || ids.is_empty() {
            let id = next_id;
            next_id += 1;
            ids.push(id);
            Command::Submit(order(
                id,
                if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                rng.gen_range(9_900..10_100),
                rng.gen_range(1..1_000),
            ))
        } else {
            let idx = rng.gen_range(0..ids.len());
            Command::Cancel(flash_feed::CancelOrder { order_id: ids.swap_remove(idx) })
        };
        engine.process(cmd);

        if step % 10_000 == 0 {
            engine.book.assert_invariants(&engine.arena);
        }
    }

    engine.book.assert_invariants(&engine.arena);
    let m = engine.listener();
    assert_eq!(m.total_rejects(), m.rejects(RejectReason::UnknownOrderId));
}

// ============================================================================
// Memory Leak Detection
// ============================================================================

#[test]
fn test_arena_returns_all_slots() {
    const CAPACITY: u32 = 1_000;
    let mut engine = metrics_engine(CAPACITY);

    for round in 0..10u64 {
        let base = round * 10_000;
        for i in 0..CAPACITY as u64 {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            let price = if side == Side::Buy { 100 } else { 200 };
            engine.submit(order(base + i, side, price, 5)).unwrap();
        }
        assert!(engine.arena.is_full());

        // Half cancelled, the other half swept
        for i in (0..CAPACITY as u64).filter(|i| i % 2 == 0) {
            engine.cancel(base + i).unwrap();
        }
        engine.submit(order(base + 5_000, Side::Buy, 200, 5 * CAPACITY / 2)).unwrap();

        assert!(engine.arena.is_empty(), "round {} leaked slots", round);
        assert!(engine.book.is_empty());
    }
}
