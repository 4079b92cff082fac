// SessionDispatcher: one logical session per connection.
//
// Decodes fixed-size request records off a blocking socket, timestamps
// them on arrival, resolves the target `OrderBook`, and forwards an
// `Event` to its intake queue. The cross-session Cancel check lives
// here: it is the one place in the system that enforces "a Cancel is
// only honored against orders submitted by the same session."
//
// Request handling is split from socket I/O (`RequestHandler` vs.
// `Session`) so the engine's actual entry point (decoded request in,
// reports out) can be driven directly by integration tests without a
// wire socket in the loop.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::logging::{LogLevel, Logger};
use common::net::tcp::TcpSocket;
use common::time::now_micros_since_epoch;
use parking_lot::Mutex;

use crate::concurrent_index::ConcurrentIndex;
use crate::engine::Event;
use crate::error::{CancelRejectReason, SessionError};
use crate::model::{Order, OrderId, RestingOrder, SessionId};
use crate::protocol::{self, Request, REQUEST_SIZE};
use crate::registry::InstrumentRegistry;
use crate::report::{Report, ReportBus};

/// Assigns monotonically increasing session ids to accepted
/// connections.
pub struct SessionIdAllocator {
    next: AtomicU32,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> SessionId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state every session needs to resolve and forward requests.
/// Cloned cheaply (everything inside is an `Arc`) into each
/// connection's thread.
#[derive(Clone)]
pub struct SharedState {
    pub registry: Arc<InstrumentRegistry>,
    pub global_orders: Arc<ConcurrentIndex<OrderId, RestingOrder>>,
    pub orders_lock: Arc<Mutex<()>>,
    pub bus: ReportBus,
    pub logger: Arc<Logger>,
}

/// Routes one session's already-decoded requests to the right
/// `OrderBook`, independent of how those requests arrived. This is the
/// engine's actual contract boundary: decoded request structs in,
/// structured report events out.
pub struct RequestHandler {
    session_id: SessionId,
    shared: SharedState,
}

impl RequestHandler {
    pub fn new(session_id: SessionId, shared: SharedState) -> Self {
        Self { session_id, shared }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Processes one already-decoded request as if it had just arrived
    /// at `arrival_timestamp`.
    pub fn handle(&self, request: Request, arrival_timestamp: u64) {
        match request {
            Request::Order {
                side,
                order_id,
                price,
                count,
                instrument,
            } => {
                let order = Order::new(
                    side,
                    order_id,
                    price,
                    count,
                    instrument,
                    arrival_timestamp,
                    self.session_id,
                );
                let book = self.shared.registry.get_or_create(
                    instrument,
                    self.shared.global_orders.clone(),
                    self.shared.orders_lock.clone(),
                    self.shared.bus.clone(),
                    self.shared.logger.clone(),
                );
                book.push(Event::Active(order));
            }
            Request::Cancel { order_id } => self.handle_cancel(order_id, arrival_timestamp),
        }
    }

    /// Looks up the order under the global orders lock (closing the
    /// race with a concurrent residual-Add publish), checks session
    /// ownership, then forwards to the owning book.
    fn handle_cancel(&self, order_id: OrderId, arrival_timestamp: u64) {
        let resting = {
            let _orders_guard = self.shared.orders_lock.lock();
            self.shared.global_orders.get(&order_id)
        };

        let resting = match resting {
            Some(resting) => resting,
            None => {
                self.reject_cancel(order_id, arrival_timestamp, CancelRejectReason::NotFound);
                return;
            }
        };

        if resting.session_id != self.session_id {
            self.reject_cancel(order_id, arrival_timestamp, CancelRejectReason::WrongSession);
            return;
        }

        let book = self.shared.registry.get_or_create(
            resting.instrument,
            self.shared.global_orders.clone(),
            self.shared.orders_lock.clone(),
            self.shared.bus.clone(),
            self.shared.logger.clone(),
        );
        book.push(Event::Cancel {
            order_id,
            side: resting.side,
            price: resting.price,
            arrival_timestamp,
        });
    }

    fn reject_cancel(&self, order_id: OrderId, arrival_timestamp: u64, reason: CancelRejectReason) {
        self.shared
            .logger
            .log_with_value(LogLevel::Debug, "cancel rejected", reason);
        let batch = self.shared.bus.register();
        batch.push(Report::Cancel {
            order_id,
            accepted: false,
            input_time: arrival_timestamp,
        });
        batch.close();
    }
}

/// One connection's session loop: reads fixed-size request records off
/// a blocking socket and feeds them to a `RequestHandler`.
pub struct Session {
    socket: TcpSocket,
    handler: RequestHandler,
}

impl Session {
    pub fn new(socket: TcpSocket, session_id: SessionId, shared: SharedState) -> Self {
        Self {
            socket,
            handler: RequestHandler::new(session_id, shared),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.handler.session_id()
    }

    /// Reads and processes requests until the connection closes or a
    /// malformed record is seen. Both terminate only this session; the
    /// caller logs the outcome and lets the thread end.
    pub fn run(mut self) -> Result<(), SessionError> {
        let mut pending: Vec<u8> = Vec::with_capacity(REQUEST_SIZE * 16);

        loop {
            while pending.len() < REQUEST_SIZE {
                match self.socket.recv() {
                    Ok(bytes) if bytes.is_empty() => {
                        // The peer closed the connection. If a full
                        // record was already pending, this is a clean
                        // EOF between requests; if only a partial record
                        // had arrived, the peer dropped mid-record,
                        // which is a short read, not a clean close.
                        return Err(if pending.is_empty() {
                            SessionError::ConnectionEof
                        } else {
                            SessionError::ShortRead {
                                got: pending.len(),
                                expected: REQUEST_SIZE,
                            }
                        });
                    }
                    Ok(bytes) => pending.extend_from_slice(bytes),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(SessionError::Io(e)),
                }
            }

            let record: Vec<u8> = pending.drain(..REQUEST_SIZE).collect();
            let arrival_timestamp = now_micros_since_epoch();

            match protocol::decode(&record) {
                Some(request) => self.handler.handle(request, arrival_timestamp),
                None => {
                    return Err(SessionError::MalformedRequest(format!(
                        "unrecognized {}-byte request record",
                        record.len()
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_assigned_sequentially() {
        let allocator = SessionIdAllocator::new();
        assert_eq!(allocator.next(), 1);
        assert_eq!(allocator.next(), 2);
        assert_eq!(allocator.next(), 3);
    }
}
