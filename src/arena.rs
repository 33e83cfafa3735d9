//! Arena Allocator - fixed pool of cache-line sized order nodes.
//!
//! Every resting order lives in one pre-allocated [`OrderNode`]. Nodes are
//! addressed by `u32` index and handed out from a free stack, so resting an
//! order or cancelling one never touches the heap once the book is built.

use crate::command::{Price, Side};

/// Link value meaning "no node"
pub const NULL_INDEX: u32 = u32::MAX;

/// Slot number inside the arena, used as a compact pointer.
pub type ArenaIndex = u32;

/// A single resting order - exactly 64 bytes (one cache line).
///
/// | Field      | Type | Offset |
/// |------------|------|--------|
/// | order_id   | u64  | 0      |
/// | sequence   | u64  | 8      |
/// | price      | i64  | 16     |
/// | qty        | u32  | 24     |
/// | prev       | u32  | 28     |
/// | next       | u32  | 32     |
/// | side       | u8   | 36     |
///
/// The tail up to 64 bytes is alignment padding.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderNode {
    /// External order ID
    pub order_id: u64,
    /// Insertion counter establishing time priority
    pub sequence: u64,
    /// Limit price in ticks
    pub price: Price,
    /// Quantity still open
    pub qty: u32,
    /// Older neighbour in the level, or `NULL_INDEX`
    pub prev: ArenaIndex,
    /// Newer neighbour in the level, or `NULL_INDEX`
    pub next: ArenaIndex,
    pub side: Side,
}

const _: () = assert!(std::mem::size_of::<OrderNode>() == 64);
const _: () = assert!(std::mem::align_of::<OrderNode>() == 64);

impl OrderNode {
    /// Contents of a slot that holds no order.
    pub const VACANT: OrderNode = OrderNode {
        order_id: 0,
        sequence: 0,
        price: 0,
        qty: 0,
        prev: NULL_INDEX,
        next: NULL_INDEX,
        side: Side::Buy,
    };

    /// An unlinked node for a resting order
    #[inline]
    pub fn new(order_id: u64, side: Side, price: Price, qty: u32, sequence: u64) -> Self {
        Self {
            order_id,
            sequence,
            price,
            qty,
            side,
            ..Self::VACANT
        }
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.prev != NULL_INDEX || self.next != NULL_INDEX
    }
}

/// Pre-allocated node pool.
///
/// Released slots go on top of the free stack and are handed out again
/// first, which keeps recently used cache lines hot.
pub struct Arena {
    slots: Box<[OrderNode]>,
    free: Vec<ArenaIndex>,
}

impl Arena {
    /// Create an arena holding at most `capacity` nodes.
    ///
    /// `NULL_INDEX` is never a valid slot, so capacity is clamped below it.
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.min(NULL_INDEX - 1);
        Self {
            slots: vec![OrderNode::VACANT; capacity as usize].into_boxed_slice(),
            // Reversed so that slot 0 is handed out first
            free: (0..capacity).rev().collect(),
        }
    }

    /// Store `node` in a free slot. Links are reset.
    ///
    /// Returns `None` when every slot is taken.
    #[inline]
    pub fn alloc(&mut self, node: OrderNode) -> Option<ArenaIndex> {
        let index = self.free.pop()?;
        self.slots[index as usize] = OrderNode {
            prev: NULL_INDEX,
            next: NULL_INDEX,
            ..node
        };
        Some(index)
    }

    /// Give a slot back.
    ///
    /// The node must already be unlinked from its level, and must not be
    /// released twice.
    #[inline]
    pub fn release(&mut self, index: ArenaIndex) {
        debug_assert!(self.free.len() < self.slots.len(), "release on an empty arena");
        debug_assert!(!self.slots[index as usize].is_linked(), "released a linked node");

        self.slots[index as usize] = OrderNode::VACANT;
        self.free.push(index);
    }

    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &OrderNode {
        &self.slots[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        &mut self.slots[index as usize]
    }

    /// Number of slots currently holding an order
    #[inline]
    pub fn len(&self) -> u32 {
        (self.slots.len() - self.free.len()) as u32
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Touch every slot so the pages are mapped before the hot loop.
    pub fn warm_up(&mut self) {
        for slot in self.slots.iter_mut() {
            // SAFETY: `slot` is a valid, exclusive reference into our own
            // allocation; the value written back is the value read.
            unsafe {
                let value = std::ptr::read_volatile(slot);
                std::ptr::write_volatile(slot, value);
            }
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64) -> OrderNode {
        OrderNode::new(id, Side::Buy, 100, 10, id)
    }

    #[test]
    fn test_node_fills_one_cache_line() {
        assert_eq!(std::mem::size_of::<OrderNode>(), 64);
        assert_eq!(std::mem::align_of::<OrderNode>(), 64);
    }

    #[test]
    fn test_new_arena_is_empty() {
        let arena = Arena::new(100);
        assert_eq!(arena.capacity(), 100);
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
        assert!(!arena.is_full());
    }

    #[test]
    fn test_zero_capacity_arena_is_full() {
        let mut arena = Arena::new(0);
        assert!(arena.is_full());
        assert!(arena.is_empty());
        assert_eq!(arena.alloc(node(1)), None);
    }

    #[test]
    fn test_slots_are_handed_out_in_order() {
        let mut arena = Arena::new(4);
        let got: Vec<_> = (0..4).map(|i| arena.alloc(node(i)).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert!(arena.is_full());
        assert_eq!(arena.alloc(node(9)), None);
    }

    #[test]
    fn test_released_slot_is_reused_first() {
        let mut arena = Arena::new(3);
        let a = arena.alloc(node(1)).unwrap();
        let b = arena.alloc(node(2)).unwrap();
        let c = arena.alloc(node(3)).unwrap();

        arena.release(b);
        assert_eq!(arena.len(), 2);
        assert_eq!(*arena.get(b), OrderNode::VACANT);
        assert_eq!(arena.alloc(node(4)), Some(b));

        for idx in [a, b, c] {
            arena.release(idx);
        }
        assert!(arena.is_empty());
    }

    #[test]
    fn test_alloc_resets_links() {
        let mut arena = Arena::new(10);
        let mut stored = OrderNode::new(12345, Side::Sell, -42, 100, 7);
        stored.prev = 3;
        stored.next = 4;

        let idx = arena.alloc(stored).unwrap();
        let got = arena.get(idx);
        assert_eq!(got.order_id, 12345);
        assert_eq!(got.side, Side::Sell);
        assert_eq!(got.price, -42);
        assert_eq!(got.qty, 100);
        assert_eq!(got.sequence, 7);
        assert!(!got.is_linked());
    }

    #[test]
    fn test_warm_up_keeps_contents() {
        let mut arena = Arena::new(1000);
        let idx = arena.alloc(node(5)).unwrap();
        arena.warm_up();
        assert_eq!(arena.get(idx).order_id, 5);
        assert_eq!(arena.len(), 1);
    }
}
