// Wire format for client requests.
//
// The core consumes decoded `Request` values; this module is the
// external collaborator that turns bytes off the socket into one.
// Fixed-size little-endian record, no padding:
//   type: u8 ('B' | 'S' | 'C')
//   order_id: u32
//   price: u32
//   count: u32
//   instrument: [u8; 9], NUL-terminated, max 8 meaningful chars

use crate::model::{Count, Instrument, OrderId, Price};
use common::Side;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
struct WireRequest {
    msg_type: u8,
    order_id: u32,
    price: u32,
    count: u32,
    instrument: [u8; 9],
}

/// Size of the fixed-size request record in bytes.
pub const REQUEST_SIZE: usize = std::mem::size_of::<WireRequest>();

/// A decoded request, independent of the wire encoding that produced it.
#[derive(Debug, Clone, Copy)]
pub enum Request {
    Order {
        side: Side,
        order_id: OrderId,
        price: Price,
        count: Count,
        instrument: Instrument,
    },
    Cancel {
        order_id: OrderId,
    },
}

/// Decodes one fixed-size request record.
///
/// Returns `None` if `bytes` doesn't hold a valid record: too short,
/// or an unrecognized `type` byte. Both are session-fatal malformed
/// requests; the caller is responsible for mapping `None` into a
/// `SessionError::MalformedRequest`.
pub fn decode(bytes: &[u8]) -> Option<Request> {
    let wire = WireRequest::read_from(bytes)?;

    let nul = wire
        .instrument
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(wire.instrument.len());
    let instrument = Instrument::new(&wire.instrument[..nul]);

    match wire.msg_type {
        b'B' => Some(Request::Order {
            side: Side::Buy,
            order_id: wire.order_id,
            price: wire.price,
            count: wire.count,
            instrument,
        }),
        b'S' => Some(Request::Order {
            side: Side::Sell,
            order_id: wire.order_id,
            price: wire.price,
            count: wire.count,
            instrument,
        }),
        b'C' => Some(Request::Cancel {
            order_id: wire.order_id,
        }),
        _ => None,
    }
}
