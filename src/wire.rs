//! Wire Codec - fixed-layout binary feed messages.
//!
//! Packed, little-endian, no padding:
//!
//! | Message     | Layout                                               | Size |
//! |-------------|------------------------------------------------------|------|
//! | AddOrder    | `'A'` id:u64 price:i32 quantity:u32 side:`'B'`/`'S'` | 18   |
//! | CancelOrder | `'C'` id:u64                                         | 9    |
//! | Sequenced   | `'S'` sequence:u64, then one message above           | +9   |
//!
//! Sequence numbers start at 1. Sequence 0 is how a queue item marks "no
//! header", so a header carrying 0 is rejected rather than decoded as an
//! unsequenced message.
//!
//! Decoding is total: any byte slice yields either a [`QueueItem`] or a
//! [`DecodeError`], and never reads past the slice. Trailing bytes beyond the
//! declared message are ignored.

use thiserror::Error;

use crate::command::{MsgType, QueueItem, Side};

pub const ADD_ORDER_LEN: usize = 18;
pub const CANCEL_ORDER_LEN: usize = 9;
pub const SEQUENCE_HEADER_LEN: usize = 9;

pub const TAG_ADD: u8 = MsgType::AddOrder as u8;
pub const TAG_CANCEL: u8 = MsgType::CancelOrder as u8;
/// Sequence header tag; the sequence that follows must be non-zero
pub const TAG_SEQUENCED: u8 = b'S';

/// Largest datagram the codec produces.
pub const MAX_MESSAGE_LEN: usize = SEQUENCE_HEADER_LEN + ADD_ORDER_LEN;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),

    #[error("truncated message: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid side byte {0:#04x}")]
    InvalidSide(u8),

    #[error("sequence header carries sequence 0")]
    ZeroSequence,
}

/// Decode a datagram into a fresh item.
pub fn decode(buf: &[u8]) -> Result<QueueItem, DecodeError> {
    let mut item = QueueItem::default();
    decode_into(buf, &mut item)?;
    Ok(item)
}

/// Decode a datagram directly into `item` (typically a claimed queue slot).
///
/// Every field except `recv_ns` is overwritten on success. On error `item` is
/// left unchanged.
pub fn decode_into(buf: &[u8], item: &mut QueueItem) -> Result<(), DecodeError> {
    let (sequence, body) = match buf.first() {
        None => return Err(DecodeError::Empty),
        Some(&TAG_SEQUENCED) => {
            check_len(buf, SEQUENCE_HEADER_LEN)?;
            let sequence = read_u64(buf, 1);
            if sequence == 0 {
                return Err(DecodeError::ZeroSequence);
            }
            let body = &buf[SEQUENCE_HEADER_LEN..];
            if body.is_empty() {
                return Err(DecodeError::Truncated {
                    expected: SEQUENCE_HEADER_LEN + 1,
                    actual: buf.len(),
                });
            }
            (sequence, body)
        }
        Some(_) => (0, buf),
    };

    // `body` is non-empty here
    match body[0] {
        TAG_ADD => {
            check_len(body, ADD_ORDER_LEN)?;
            let side = Side::from_byte(body[17]).ok_or(DecodeError::InvalidSide(body[17]))?;
            *item = QueueItem {
                kind: MsgType::AddOrder,
                id: read_u64(body, 1),
                price: read_i32(body, 9),
                quantity: read_u32(body, 13),
                side,
                sequence,
                recv_ns: item.recv_ns,
            };
        }
        TAG_CANCEL => {
            check_len(body, CANCEL_ORDER_LEN)?;
            *item = QueueItem {
                kind: MsgType::CancelOrder,
                id: read_u64(body, 1),
                sequence,
                recv_ns: item.recv_ns,
                ..QueueItem::default()
            };
        }
        other => return Err(DecodeError::UnknownType(other)),
    }

    Ok(())
}

/// Append an AddOrder message.
pub fn encode_add(out: &mut Vec<u8>, id: u64, price: i32, quantity: u32, side: Side) {
    out.push(TAG_ADD);
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&price.to_le_bytes());
    out.extend_from_slice(&quantity.to_le_bytes());
    out.push(side.as_byte());
}

/// Append a CancelOrder message.
pub fn encode_cancel(out: &mut Vec<u8>, id: u64) {
    out.push(TAG_CANCEL);
    out.extend_from_slice(&id.to_le_bytes());
}

/// Append a sequence header; the message body must follow.
pub fn encode_sequence_header(out: &mut Vec<u8>, sequence: u64) {
    out.push(TAG_SEQUENCED);
    out.extend_from_slice(&sequence.to_le_bytes());
}

/// Append the wire form of `item`, with a sequence header when
/// `item.sequence` is non-zero.
pub fn encode(out: &mut Vec<u8>, item: &QueueItem) {
    if item.sequence != 0 {
        encode_sequence_header(out, item.sequence);
    }
    match item.kind {
        MsgType::AddOrder => encode_add(out, item.id, item.price, item.quantity, item.side),
        MsgType::CancelOrder => encode_cancel(out, item.id),
    }
}

#[inline]
fn check_len(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

// Callers have checked the length.

#[inline]
fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(bytes)
}
