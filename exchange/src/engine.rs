// OrderBook: per-instrument dispatch.
//
// Each instrument owns a bid `Book`, an ask `Book`, a bounded intake
// queue of `Event`s, and `sgl`, a single-slot guard serializing the
// match-then-add transition of one active order against any other
// active order on the *same* book. Cancels never take `sgl`: they only
// ever need the hand-over-hand chain locks of whichever side they
// target, so a cancel on the bid side can run while an active order is
// mid-match against the ask side.
//
// One dedicated intake fiber per instrument receives `Event`s and
// spawns a short-lived worker thread per event, one OS thread per
// event rather than a pooled worker set.

use std::sync::Arc;
use std::thread;

use common::logging::{LogLevel, Logger};
use common::Side;
use parking_lot::Mutex;

use crate::book::{Book, BookSide};
use crate::concurrent_index::ConcurrentIndex;
use crate::model::{Instrument, Order, OrderId, Price, RestingOrder};
use crate::report::{Report, ReportBus};

/// Bound on an instrument's intake queue. An aggressive burst of
/// activity on one instrument backpressures the sessions feeding it
/// rather than growing without limit.
const INTAKE_CAPACITY: usize = 4096;

/// One unit of work handed from a session to an `OrderBook`'s intake
/// fiber: a decoded request plus its arrival timestamp.
pub enum Event {
    /// A newly submitted Buy or Sell.
    Active(Order),
    /// A Cancel already authorized by the session (same-session check
    /// passed); routing by side/price still has to happen against the
    /// book.
    Cancel {
        order_id: OrderId,
        side: Side,
        price: Price,
        arrival_timestamp: u64,
    },
}

fn book_side_for(side: Side) -> BookSide {
    match side {
        Side::Buy => BookSide::Bid,
        Side::Sell => BookSide::Ask,
    }
}

/// Per-instrument container: the two sides' books, the intake queue,
/// and the `sgl`. Owned by the `InstrumentRegistry`; sessions only ever
/// see the `OrderBookHandle` wrapping it.
pub struct OrderBookHandle {
    instrument: Instrument,
    sender: crossbeam_channel::Sender<Event>,
}

impl OrderBookHandle {
    /// Spawns this instrument's intake fiber and returns a handle
    /// sessions can push `Event`s into. Called exactly once per
    /// instrument, from `InstrumentRegistry::get_or_create`'s
    /// first-registration-wins path.
    pub fn spawn(
        instrument: Instrument,
        global_orders: Arc<ConcurrentIndex<OrderId, RestingOrder>>,
        orders_lock: Arc<Mutex<()>>,
        bus: ReportBus,
        logger: Arc<Logger>,
    ) -> Arc<Self> {
        let bid = Arc::new(Book::new(BookSide::Bid));
        let ask = Arc::new(Book::new(BookSide::Ask));
        let sgl = Arc::new(Mutex::new(()));

        let (sender, receiver) = crossbeam_channel::bounded::<Event>(INTAKE_CAPACITY);

        thread::Builder::new()
            .name(format!("ob-intake-{}", instrument))
            .spawn(move || {
                for event in receiver.iter() {
                    let bid = bid.clone();
                    let ask = ask.clone();
                    let global_orders = global_orders.clone();
                    let orders_lock = orders_lock.clone();
                    let sgl = sgl.clone();
                    let bus = bus.clone();
                    let logger = logger.clone();
                    thread::spawn(move || match event {
                        Event::Active(order) => {
                            process_active(order, &bid, &ask, &global_orders, &orders_lock, &sgl, &bus)
                        }
                        Event::Cancel {
                            order_id,
                            side,
                            price,
                            arrival_timestamp,
                        } => process_cancel(
                            order_id,
                            side,
                            price,
                            arrival_timestamp,
                            &bid,
                            &ask,
                            &global_orders,
                            &bus,
                            &logger,
                        ),
                    });
                }
            })
            .expect("failed to spawn order book intake thread");

        Arc::new(Self { instrument, sender })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    /// Pushes an event onto this instrument's intake queue. Blocks if
    /// the queue is momentarily full, applying backpressure to the
    /// session that submitted it.
    pub fn push(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// Matches an active Buy/Sell against the opposite side's resting
/// liquidity, then rests any residue on this order's own side.
fn process_active(
    order: Order,
    bid: &Arc<Book>,
    ask: &Arc<Book>,
    global_orders: &Arc<ConcurrentIndex<OrderId, RestingOrder>>,
    orders_lock: &Arc<Mutex<()>>,
    sgl: &Arc<Mutex<()>>,
    bus: &ReportBus,
) {
    let _sgl_guard = sgl.lock();

    let (match_book, add_book) = match order.side {
        Side::Buy => (ask, bid),
        Side::Sell => (bid, ask),
    };

    let residue = match_book.match_order(
        order.order_id,
        order.price,
        order.count,
        order.arrival_timestamp,
        bus,
        global_orders,
    );

    if residue > 0 {
        let mut residual = order.clone();
        residual.count = residue;

        let head = add_book.lock_head();
        {
            // `orders_lock` makes this publish atomic with respect to a
            // concurrent Cancel's lookup.
            let _orders_guard = orders_lock.lock();
            global_orders.set(
                residual.order_id,
                RestingOrder {
                    side: residual.side,
                    price: residual.price,
                    instrument: residual.instrument,
                    session_id: residual.session_id,
                },
            );
        }

        // Registered here, synchronously, while `_sgl_guard` is still
        // held, so the residual Add's bus position (not just its book
        // mutation) falls after this order's own match walk and before
        // the next active order's on this book. Only the batch's *fill*
        // (`addBook.add` itself) runs in the spawned worker; the
        // *enqueue* happens right here.
        let batch = bus.register();

        let add_book = add_book.clone();
        thread::spawn(move || {
            add_book.add(head, residual, &batch);
        });
    }

    // `_sgl_guard` drops here: the next active order on this book may
    // now proceed. By this point any residue has already been
    // re-acquired into the add-side book's head guard (above) and its
    // Add batch already enqueued on the bus, so no other active order
    // can observe a half-published residual or jump it in report order.
}

/// The session has already authorized this cancel against its own
/// session id; this only has to route it to the right side/price and
/// emit the accept/reject report.
fn process_cancel(
    order_id: OrderId,
    side: Side,
    price: Price,
    arrival_timestamp: u64,
    bid: &Arc<Book>,
    ask: &Arc<Book>,
    global_orders: &Arc<ConcurrentIndex<OrderId, RestingOrder>>,
    bus: &ReportBus,
    logger: &Logger,
) {
    let book = match book_side_for(side) {
        BookSide::Bid => bid,
        BookSide::Ask => ask,
    };

    let head = book.lock_head();
    let batch = bus.register();
    let found = book.cancel(head, order_id, price);
    if found {
        global_orders.remove(&order_id);
    } else {
        // The global index routed this cancel here, so its absence from
        // the book itself means a concurrent match already consumed it
        // between the index lookup and this book taking `head`.
        logger.log_with_value(
            LogLevel::Debug,
            "cancel rejected",
            crate::error::CancelRejectReason::WrongPriceLevel,
        );
    }
    batch.push(Report::Cancel {
        order_id,
        accepted: found,
        input_time: arrival_timestamp,
    });
    batch.close();
}
