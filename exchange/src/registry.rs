// InstrumentRegistry: lazily-constructed per-instrument OrderBooks.
//
// A ConcurrentIndex keyed by instrument symbol whose values are
// `OrderBookHandle`s. The first session to mention a given instrument
// pays the cost of spawning that book's intake fiber; every later
// lookup, on any session or thread, gets back the same handle.
// `ConcurrentIndex::get_or_insert_with`'s idempotent-insert semantics
// give exactly the "first registration wins" rule an instrument
// registry needs.

use std::sync::Arc;

use common::logging::Logger;
use parking_lot::Mutex;

use crate::concurrent_index::ConcurrentIndex;
use crate::engine::OrderBookHandle;
use crate::model::{Instrument, OrderId, RestingOrder};
use crate::report::ReportBus;

pub struct InstrumentRegistry {
    books: ConcurrentIndex<Instrument, Arc<OrderBookHandle>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self {
            books: ConcurrentIndex::new(),
        }
    }

    /// Returns the `OrderBookHandle` for `instrument`, spawning a fresh
    /// one (its intake fiber, bid book, ask book, and `sgl`) the
    /// first time this instrument is seen.
    pub fn get_or_create(
        &self,
        instrument: Instrument,
        global_orders: Arc<ConcurrentIndex<OrderId, RestingOrder>>,
        orders_lock: Arc<Mutex<()>>,
        bus: ReportBus,
        logger: Arc<Logger>,
    ) -> Arc<OrderBookHandle> {
        self.books.get_or_insert_with(instrument, || {
            OrderBookHandle::spawn(instrument, global_orders, orders_lock, bus, logger)
        })
    }

    pub fn instrument_count(&self) -> usize {
        self.books.len()
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PMutex;
    use std::io::Write;

    struct Discard;
    impl Write for Discard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn same_instrument_returns_the_same_book_handle() {
        let registry = InstrumentRegistry::new();
        let global_orders = Arc::new(ConcurrentIndex::with_stripes(4));
        let orders_lock = Arc::new(PMutex::new(()));
        let (bus, _printer) = ReportBus::spawn(Discard);
        let logger = Arc::new(Logger::new());

        let a = registry.get_or_create(
            Instrument::from("IBM"),
            global_orders.clone(),
            orders_lock.clone(),
            bus.clone(),
            logger.clone(),
        );
        let b = registry.get_or_create(Instrument::from("IBM"), global_orders, orders_lock, bus, logger);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.instrument_count(), 1);
    }

    #[test]
    fn distinct_instruments_get_distinct_books() {
        let registry = InstrumentRegistry::new();
        let global_orders = Arc::new(ConcurrentIndex::with_stripes(4));
        let orders_lock = Arc::new(PMutex::new(()));
        let (bus, _printer) = ReportBus::spawn(Discard);
        let logger = Arc::new(Logger::new());

        registry.get_or_create(
            Instrument::from("IBM"),
            global_orders.clone(),
            orders_lock.clone(),
            bus.clone(),
            logger.clone(),
        );
        registry.get_or_create(Instrument::from("MSFT"), global_orders, orders_lock, bus, logger);

        assert_eq!(registry.instrument_count(), 2);
    }
}
