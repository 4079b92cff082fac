// Core data: the Order record and the Instrument symbol it trades.

use common::Side;
use std::fmt;

pub type OrderId = u32;
pub type Price = u32;
pub type Count = u32;
pub type SessionId = u32;

/// An instrument symbol, at most 8 meaningful ASCII characters.
///
/// Stored as a fixed 8-byte buffer rather than a heap `String` so that
/// decoding a wire request and indexing an `OrderBook` by instrument
/// never allocates.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instrument {
    bytes: [u8; 8],
    len: u8,
}

impl Instrument {
    /// Builds an `Instrument` from up to 8 meaningful bytes, truncating
    /// anything longer.
    pub fn new(s: &[u8]) -> Self {
        let len = s.len().min(8);
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&s[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Instrument::new(s.as_bytes())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instrument({:?})", self.as_str())
    }
}

/// A resting or active order.
///
/// All fields except `count` and `execution_id` are immutable for the
/// lifetime of the order. `count` and `execution_id` are mutated in
/// place while the order rests in a `PriceLevel`, under that level's
/// guard (see `book::PriceLevel`).
#[derive(Clone, Debug)]
pub struct Order {
    pub side: Side,
    pub order_id: OrderId,
    pub price: Price,
    pub count: Count,
    pub instrument: Instrument,
    pub arrival_timestamp: u64,
    pub session_id: SessionId,
    /// Counter of partial fills against this resting order. Starts at 1;
    /// increments each time a partial match consumes some of it.
    pub execution_id: u32,
}

impl Order {
    pub fn new(
        side: Side,
        order_id: OrderId,
        price: Price,
        count: Count,
        instrument: Instrument,
        arrival_timestamp: u64,
        session_id: SessionId,
    ) -> Self {
        Self {
            side,
            order_id,
            price,
            count,
            instrument,
            arrival_timestamp,
            session_id,
            execution_id: 1,
        }
    }
}

/// What the global order index stores for a resting order.
///
/// The canonical mutable `count`/`execution_id` live only inside the
/// `PriceLevel` FIFO entry itself, guarded by that level's lock. This
/// descriptor carries just enough to route and authorize a Cancel
/// (which side/price/instrument to look on, and which session may
/// cancel it) without a second lock shared with the book.
#[derive(Clone, Copy, Debug)]
pub struct RestingOrder {
    pub side: Side,
    pub price: Price,
    pub instrument: Instrument,
    pub session_id: SessionId,
}
