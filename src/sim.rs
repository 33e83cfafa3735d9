//! Synthetic order flow for load generation and tests.
//!
//! Produces micro-bursts of add/cancel messages around a random-walking
//! price: every message moves the price by -5, 0 or +5 ticks (30/40/30),
//! floored at 100; 80% are adds with quantity 1..=100 and a fair-coin side,
//! 20% cancel a random live order when one exists.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::command::{MsgType, QueueItem, Side};

pub const START_PRICE: i32 = 10_000;
pub const PRICE_FLOOR: i32 = 100;
pub const PRICE_STEP: i32 = 5;

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub min_burst: usize,
    pub max_burst: usize,
    /// Probability that a message is a cancel (when a live order exists)
    pub cancel_ratio: f64,
    /// Stamp feed sequence numbers starting at 1
    pub sequenced: bool,
    /// Skip one sequence number after every `n` messages (0 = never)
    pub skip_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            min_burst: 10,
            max_burst: 100,
            cancel_ratio: 0.2,
            sequenced: false,
            skip_every: 0,
        }
    }
}

pub struct MarketSim {
    rng: ChaCha8Rng,
    config: SimConfig,
    price: i32,
    next_id: u64,
    next_sequence: u64,
    emitted: u64,
    live: Vec<u64>,
}

impl MarketSim {
    pub fn new(seed: u64, config: SimConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            price: START_PRICE,
            next_id: 1,
            next_sequence: 1,
            emitted: 0,
            live: Vec::new(),
        }
    }

    pub fn price(&self) -> i32 {
        self.price
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Generate one burst, appending to `out`.
    pub fn burst(&mut self, out: &mut Vec<QueueItem>) {
        let size = self
            .rng
            .gen_range(self.config.min_burst..=self.config.max_burst.max(self.config.min_burst));
        for _ in 0..size {
            out.push(self.next_message());
        }
    }

    pub fn next_message(&mut self) -> QueueItem {
        self.walk_price();

        let mut item = if !self.live.is_empty() && self.rng.gen_bool(self.config.cancel_ratio) {
            let idx = self.rng.gen_range(0..self.live.len());
            let id = self.live.swap_remove(idx);
            QueueItem {
                kind: MsgType::CancelOrder,
                id,
                ..QueueItem::default()
            }
        } else {
            let id = self.next_id;
            self.next_id += 1;
            self.live.push(id);
            QueueItem {
                kind: MsgType::AddOrder,
                id,
                price: self.price,
                quantity: self.rng.gen_range(1..=100),
                side: if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                ..QueueItem::default()
            }
        };

        if self.config.sequenced {
            item.sequence = self.next_sequence;
            self.next_sequence += 1;
            let skip = self.config.skip_every;
            if skip > 0 && (self.emitted + 1) % skip == 0 {
                self.next_sequence += 1;
            }
        }
        self.emitted += 1;
        item
    }

    fn walk_price(&mut self) {
        let roll: f64 = self.rng.gen();
        let step = if roll < 0.3 {
            -PRICE_STEP
        } else if roll < 0.7 {
            0
        } else {
            PRICE_STEP
        };
        self.price = (self.price + step).max(PRICE_FLOOR);
    }
}
