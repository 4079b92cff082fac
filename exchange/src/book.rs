// Book: one side of one instrument's order book.
//
// A singly-linked chain of `PriceLevel`s starting at a sentinel `head`,
// kept sorted by the side's price priority. Structural changes and the
// FIFO at each level are protected by one lock per level; the chain is
// walked hand-over-hand. The next level's lock is always acquired
// before the current one is released, so a concurrent walker can never
// observe a torn `next` pointer or a level mid-splice.
//
// `parking_lot`'s `arc_lock` feature gives us `ArcMutexGuard`, an owned
// guard that carries its own `Arc` clone internally rather than
// borrowing a local variable. That's what makes the hand-over-hand walk
// expressible in safe Rust: each loop iteration can acquire the next
// level's guard and only then overwrite the variable holding the
// previous one, which drops (and unlocks) it at exactly that point.

use std::collections::VecDeque;
use std::sync::Arc;

use lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::concurrent_index::ConcurrentIndex;
use crate::model::{Count, Order, OrderId, Price, RestingOrder};
use crate::report::{Report, ReportBatch, ReportBus};

/// Which side of an instrument this `Book` represents. Determines both
/// the insertion-priority ordering (`better`) and the aggression
/// predicate used when this book is the matching side for an active
/// order on the opposite side. The two are distinct functions of the
/// same side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

/// All orders at one price, for one side of one instrument.
pub struct PriceLevel {
    price: Price,
    volume: Count,
    orders: VecDeque<Order>,
}

impl PriceLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            volume: 0,
            orders: VecDeque::new(),
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn volume(&self) -> Count {
        self.volume
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn push(&mut self, order: Order) {
        self.volume += order.count;
        self.orders.push_back(order);
    }

    fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    fn pop_front(&mut self) -> Option<Order> {
        let order = self.orders.pop_front()?;
        self.volume -= order.count;
        Some(order)
    }

    /// Removes the order with the given id, wherever it sits in the
    /// FIFO (a cancel walks arrival order, not price order, inside a
    /// level). Linear search.
    fn remove(&mut self, order_id: OrderId) -> bool {
        if let Some(pos) = self.orders.iter().position(|o| o.order_id == order_id) {
            let order = self.orders.remove(pos).expect("position just found");
            self.volume -= order.count;
            true
        } else {
            false
        }
    }
}

/// One node of the chain: a level plus the pointer to the next one.
/// The `head` node's own `level` is a sentinel: its price is never
/// read structurally, only `next` matters.
pub struct PriceLevelNode {
    level: PriceLevel,
    next: Option<Arc<Mutex<PriceLevelNode>>>,
}

/// An owned, freely-reassignable lock on one chain node. Unlike a
/// plain `MutexGuard`, this doesn't borrow a local variable, so a loop
/// can hold two at once and then drop the trailing one by simply
/// overwriting the binding that held it, exactly the hand-over-hand
/// discipline this walk needs.
pub type LevelGuard = ArcMutexGuard<RawMutex, PriceLevelNode>;

pub struct Book {
    head: Arc<Mutex<PriceLevelNode>>,
    side: BookSide,
}

impl Book {
    pub fn new(side: BookSide) -> Self {
        Self {
            head: Arc::new(Mutex::new(PriceLevelNode {
                level: PriceLevel::new(0),
                next: None,
            })),
            side,
        }
    }

    pub fn side(&self) -> BookSide {
        self.side
    }

    /// `true` if `a` has strictly better insertion priority than `b`
    /// on this side: bids rank higher price first, asks lower price
    /// first.
    fn better(&self, a: Price, b: Price) -> bool {
        match self.side {
            BookSide::Bid => a > b,
            BookSide::Ask => a < b,
        }
    }

    /// The aggression predicate for an active order matching against
    /// *this* book. A Buy only ever matches against the Ask book
    /// (`active >= level`); a Sell only ever matches against the Bid
    /// book (`active <= level`). The predicate is a pure function of
    /// which side this book is, not of the active order's side.
    fn should_fill(&self, active_price: Price, level_price: Price) -> bool {
        match self.side {
            BookSide::Ask => active_price >= level_price,
            BookSide::Bid => active_price <= level_price,
        }
    }

    /// Acquires the head sentinel's lock. Callers needing to perform a
    /// structural operation that must start with the head held (`add`,
    /// `cancel`) acquire it here and hand the guard to that method.
    pub fn lock_head(&self) -> LevelGuard {
        self.head.lock_arc()
    }

    /// Walks levels best-to-worst, consuming resting liquidity into
    /// `residue` while `should_fill` holds, until either `residue`
    /// reaches zero or a level fails the predicate. Returns whatever
    /// residue remains.
    ///
    /// Emitted Execute reports are grouped into one batch per level
    /// visited, registered on the bus in walk order; that ordering is
    /// what gives reports their total order downstream.
    #[allow(clippy::too_many_arguments)]
    pub fn match_order(
        &self,
        active_id: OrderId,
        active_price: Price,
        mut residue: Count,
        arrival_timestamp: u64,
        bus: &ReportBus,
        global_orders: &ConcurrentIndex<OrderId, RestingOrder>,
    ) -> Count {
        let mut prev = self.head.lock_arc();

        loop {
            let curr_arc = match &prev.next {
                Some(arc) => arc.clone(),
                None => break,
            };
            let mut curr = curr_arc.lock_arc();

            if residue == 0 || !self.should_fill(active_price, curr.level.price()) {
                break;
            }

            let batch = bus.register();
            while residue > 0 {
                let front_count = match curr.level.front_mut() {
                    Some(front) => front.count,
                    None => break,
                };
                if front_count <= residue {
                    residue -= front_count;
                    let done = curr
                        .level
                        .pop_front()
                        .expect("front_mut just returned Some");
                    global_orders.remove(&done.order_id);
                    batch.push(Report::Execute {
                        resting_id: done.order_id,
                        active_id,
                        execution_id: done.execution_id,
                        price: done.price,
                        matched_count: done.count,
                        input_time: arrival_timestamp,
                    });
                } else {
                    let matched_count = residue;
                    let front = curr
                        .level
                        .front_mut()
                        .expect("front_count was just read from this same front");
                    front.count -= matched_count;
                    let report = Report::Execute {
                        resting_id: front.order_id,
                        active_id,
                        execution_id: front.execution_id,
                        price: front.price,
                        matched_count,
                        input_time: arrival_timestamp,
                    };
                    // Bump for the *next* partial fill. This report
                    // carries the execution number just consumed
                    // (execution id e means e-1 partial fills so far,
                    // so the fill that makes it e-1+1 still reports
                    // e-1, i.e. the pre-bump value).
                    front.execution_id += 1;
                    residue = 0;
                    batch.push(report);
                }
            }
            batch.close();

            if curr.level.is_empty() {
                // Unlink the now-empty level: the previous node's
                // `next` is retargeted past it.
                prev.next = curr.next.clone();
                if residue == 0 {
                    break;
                }
                // `curr` drops at the end of this iteration, unlocking
                // it; `prev` already points past it, so the next
                // iteration resumes correctly.
            } else {
                if residue == 0 {
                    break;
                }
                // Hand over: `curr` is already locked, so dropping the
                // old `prev` here never leaves a gap a concurrent
                // mutator could exploit.
                prev = curr;
            }
        }

        residue
    }

    /// Inserts a resting order, starting from an already-held `head`
    /// guard. Finds the insertion point by hand-over-hand walking and
    /// either appends to an existing level's FIFO or splices a new one
    /// in, then emits the Add report into `batch`.
    ///
    /// `batch` must already be registered on the bus by the caller:
    /// the registration itself must happen synchronously, before any
    /// worker thread that fills and closes it is spawned, so the bus's
    /// enqueue order still reflects the caller's total order even
    /// though the fill can run later.
    pub fn add(&self, head: LevelGuard, order: Order, batch: &ReportBatch) {
        let mut prev = head;

        loop {
            match &prev.next {
                None => {
                    let mut node = PriceLevelNode {
                        level: PriceLevel::new(order.price),
                        next: None,
                    };
                    node.level.push(order.clone());
                    prev.next = Some(Arc::new(Mutex::new(node)));
                    break;
                }
                Some(next_arc) => {
                    let next_arc = next_arc.clone();
                    let mut next = next_arc.lock_arc();
                    if next.level.price() == order.price {
                        next.level.push(order.clone());
                        break;
                    } else if self.better(order.price, next.level.price()) {
                        let mut node = PriceLevelNode {
                            level: PriceLevel::new(order.price),
                            next: Some(next_arc.clone()),
                        };
                        node.level.push(order.clone());
                        prev.next = Some(Arc::new(Mutex::new(node)));
                        break;
                    } else {
                        prev = next;
                    }
                }
            }
        }

        batch.push(Report::Add {
            side: order.side,
            order_id: order.order_id,
            instrument: order.instrument,
            price: order.price,
            count: order.count,
            input_time: order.arrival_timestamp,
        });
        batch.close();
    }

    /// Removes `order_id` from the level at `price`, starting from an
    /// already-held `head` guard. Returns whether it was found. A
    /// miss means the caller races a concurrent match that already
    /// drained it, or the global index was stale.
    pub fn cancel(&self, head: LevelGuard, order_id: OrderId, price: Price) -> bool {
        let mut prev = head;

        loop {
            let curr_arc = match &prev.next {
                Some(arc) => arc.clone(),
                None => return false,
            };
            let mut curr = curr_arc.lock_arc();

            if curr.level.price() == price {
                let found = curr.level.remove(order_id);
                if curr.level.is_empty() {
                    prev.next = curr.next.clone();
                }
                return found;
            } else if self.better(price, curr.level.price()) {
                // We've walked past where `price` would sit: no such
                // level exists.
                return false;
            } else {
                prev = curr;
            }
        }
    }

    /// Test/diagnostic helper: `(price, volume, order_count)` for every
    /// live level, best to worst.
    #[cfg(test)]
    fn levels(&self) -> Vec<(Price, Count, usize)> {
        let mut out = Vec::new();
        let mut next = self.head.lock_arc().next.clone();
        while let Some(arc) = next {
            let guard = arc.lock_arc();
            out.push((
                guard.level.price(),
                guard.level.volume(),
                guard.level.order_count(),
            ));
            next = guard.next.clone();
        }
        out
    }
}
