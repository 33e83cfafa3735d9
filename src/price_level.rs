//! Price Level - FIFO queue of the orders resting at one price.
//!
//! The queue is an intrusive doubly-linked list threaded through the arena
//! nodes' `prev`/`next` links, so appending, taking the oldest order and
//! cancelling from the middle are all O(1).

use crate::arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};

/// Orders at one price, oldest first, plus their aggregates.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Oldest order (next to trade)
    pub head: ArenaIndex,
    /// Newest order
    pub tail: ArenaIndex,
    /// Sum of open quantity
    pub total_qty: u64,
    pub count: u32,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: 0,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Oldest order in the level
    #[inline]
    pub fn front(&self) -> Option<ArenaIndex> {
        (self.head != NULL_INDEX).then_some(self.head)
    }

    /// Append an unlinked node behind the newest order.
    #[inline]
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let old_tail = self.tail;
        let node = arena.get_mut(index);
        node.prev = old_tail;
        node.next = NULL_INDEX;
        let qty = node.qty;

        match old_tail {
            NULL_INDEX => self.head = index,
            tail => arena.get_mut(tail).next = index,
        }
        self.tail = index;
        self.count += 1;
        self.total_qty += u64::from(qty);
    }

    /// Unlink the oldest order. The slot is not released.
    #[inline]
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<ArenaIndex> {
        let head = self.front()?;
        self.remove(arena, head);
        Some(head)
    }

    /// Unlink `index` from wherever it sits and take its open quantity off
    /// the aggregate. The slot is not released.
    ///
    /// Returns `true` if the level is now empty.
    #[inline]
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let OrderNode { prev, next, qty, .. } = *arena.get(index);

        match prev {
            NULL_INDEX => {
                debug_assert_eq!(self.head, index);
                self.head = next;
            }
            prev => arena.get_mut(prev).next = next,
        }
        match next {
            NULL_INDEX => {
                debug_assert_eq!(self.tail, index);
                self.tail = prev;
            }
            next => arena.get_mut(next).prev = prev,
        }

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count -= 1;
        self.total_qty -= u64::from(qty);
        self.is_empty()
    }

    /// Account for `qty` traded off an order that stays in the level.
    #[inline]
    pub fn reduce(&mut self, qty: u32) {
        debug_assert!(self.total_qty >= u64::from(qty));
        self.total_qty -= u64::from(qty);
    }

    /// Walk the level from oldest to newest.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }
}

/// Iterator over one level in time priority.
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = &'a OrderNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let node = self.arena.get(self.cursor);
        self.cursor = node.next;
        Some(node)
    }
}
