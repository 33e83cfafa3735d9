//! Command and Event types for the matching engine.
//!
//! Commands are inputs from the network thread (via [`QueueItem`]).
//! Events are the notifications the book hands to its [`Listener`].
//!
//! [`Listener`]: crate::listener::Listener

/// Price in minimum-tick units (signed).
pub type Price = i64;

/// Order side
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[default]
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire representation (`'B'` / `'S'`)
    #[inline]
    pub const fn as_byte(self) -> u8 {
        match self {
            Side::Buy => b'B',
            Side::Sell => b'S',
        }
    }

    #[inline]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'B' => Some(Side::Buy),
            b'S' => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Message kind carried by a queue item. Discriminants are the wire tags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    #[default]
    AddOrder = b'A',
    CancelOrder = b'C',
}

// ============================================================================
// Transport Item
// ============================================================================

/// One decoded feed message as it sits in a transport queue slot.
///
/// `price`, `quantity` and `side` are meaningless when `kind` is
/// [`MsgType::CancelOrder`]. A `sequence` of 0 means the datagram carried no
/// sequence header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueItem {
    pub kind: MsgType,
    pub id: u64,
    pub price: i32,
    pub quantity: u32,
    pub side: Side,
    /// Feed-level sequence number (gap detection), not time priority
    pub sequence: u64,
    /// Receipt timestamp in nanoseconds from the feed thread's clock
    pub recv_ns: u64,
}

impl QueueItem {
    /// Convert the transport item into a book command.
    #[inline]
    pub fn command(&self) -> Command {
        match self.kind {
            MsgType::AddOrder => Command::Submit(NewOrder {
                order_id: self.id,
                side: self.side,
                price: Price::from(self.price),
                qty: self.quantity,
            }),
            MsgType::CancelOrder => Command::Cancel(CancelOrder { order_id: self.id }),
        }
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Submit a new limit order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewOrder {
    /// External order ID (producer-assigned)
    pub order_id: u64,
    /// Order side
    pub side: Side,
    /// Limit price in ticks
    pub price: Price,
    /// Order quantity
    pub qty: u32,
}

/// Cancel an existing order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelOrder {
    /// Order ID to cancel
    pub order_id: u64,
}

/// Input commands for the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Submit(NewOrder),
    Cancel(CancelOrder),
}

// ============================================================================
// Output Events
// ============================================================================

/// A trade was executed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    /// Incoming (taker) order ID
    pub aggressor_id: u64,
    /// Resting (maker) order ID
    pub resting_id: u64,
    /// Execution price, always the resting order's price
    pub price: Price,
    /// Executed quantity
    pub qty: u32,
    /// Side of the aggressor
    pub aggressor_side: Side,
}

/// Order came to rest in the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderAdded {
    pub order_id: u64,
    pub side: Side,
    pub price: Price,
    /// Quantity left resting after any crossing
    pub qty: u32,
}

/// Order was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCancelled {
    pub order_id: u64,
    pub side: Side,
    pub price: Price,
    /// Remaining quantity that was cancelled
    pub qty: u32,
}

/// Order or cancel request was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRejected {
    pub order_id: u64,
    pub reason: RejectReason,
}

/// Reasons for rejection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectReason {
    /// Quantity was zero
    InvalidQuantity = 0,
    /// Order ID is resting or was already used this session
    DuplicateOrderId = 1,
    /// Cancel for an ID that is not resting
    UnknownOrderId = 2,
    /// Arena has no free node for a new resting order
    BookFull = 3,
}

impl RejectReason {
    pub const ALL: [RejectReason; 4] = [
        RejectReason::InvalidQuantity,
        RejectReason::DuplicateOrderId,
        RejectReason::UnknownOrderId,
        RejectReason::BookFull,
    ];
}

/// Aggregate change at one price level (Level 2 market data)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUpdate {
    /// Which side changed
    pub side: Side,
    /// Price level that changed
    pub price: Price,
    /// New total quantity at this price (0 = level removed)
    pub qty: u64,
    /// New order count at this price
    pub count: u32,
}

/// Any book notification, as a single value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookEvent {
    Trade(Trade),
    Added(OrderAdded),
    Cancelled(OrderCancelled),
    Rejected(OrderRejected),
    Level(LevelUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_bytes() {
        assert_eq!(Side::from_byte(b'B'), Some(Side::Buy));
        assert_eq!(Side::from_byte(b'S'), Some(Side::Sell));
        assert_eq!(Side::from_byte(b'X'), None);
        assert_eq!(Side::from_byte(Side::Sell.as_byte()), Some(Side::Sell));
    }

    #[test]
    fn test_add_item_to_command() {
        let item = QueueItem {
            kind: MsgType::AddOrder,
            id: 7,
            price: -250,
            quantity: 40,
            side: Side::Sell,
            sequence: 3,
            recv_ns: 0,
        };

        assert_eq!(
            item.command(),
            Command::Submit(NewOrder { order_id: 7, side: Side::Sell, price: -250, qty: 40 })
        );
    }

    #[test]
    fn test_cancel_item_ignores_order_fields() {
        let item = QueueItem {
            kind: MsgType::CancelOrder,
            id: 9,
            price: 123,
            quantity: 5,
            ..QueueItem::default()
        };

        match item.command() {
            Command::Cancel(c) => assert_eq!(c.order_id, 9),
            other => panic!("Expected Cancel, got {:?}", other),
        }
    }
}
