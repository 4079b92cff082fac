// ReportBus: total ordering of reports per logical step.
//
// Every operation that will emit reports allocates a `ReportBatch`,
// pushes it onto the bus, then fills and closes it. The printer drains
// batches strictly in enqueue order, and each batch strictly in push
// order, so enqueue-before-fill under the right guard is what gives
// the whole system its report ordering. See book::Book::match_order
// and engine for where batches are actually enqueued.

use common::lf_queue::LFQueue;
use common::time::now_micros_since_epoch;
use common::Side;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::model::{Count, Instrument, OrderId, Price};

/// One exec/add/cancel report, independent of its textual rendering.
#[derive(Debug, Clone)]
pub enum Report {
    Add {
        side: Side,
        order_id: OrderId,
        instrument: Instrument,
        price: Price,
        count: Count,
        input_time: u64,
    },
    Execute {
        resting_id: OrderId,
        active_id: OrderId,
        execution_id: u32,
        price: Price,
        matched_count: Count,
        input_time: u64,
    },
    Cancel {
        order_id: OrderId,
        accepted: bool,
        input_time: u64,
    },
}

/// Capacity of one report batch. A single aggressive order sweeping more
/// resting orders than this within one price level would block the
/// filling thread rather than lose a report (see `ReportBatch::push`).
const BATCH_CAPACITY: usize = 1024;

/// A single-producer single-consumer channel for the reports of one
/// logical operation (one match walk, one add, one cancel).
///
/// Backed by `common::lf_queue::LFQueue`, whose SPSC contract is an
/// exact match: exactly one worker thread fills a batch, and only the
/// printer ever drains it.
pub struct ReportBatch {
    queue: LFQueue<Report, BATCH_CAPACITY>,
    closed: AtomicBool,
}

impl ReportBatch {
    fn new() -> Self {
        Self {
            queue: LFQueue::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a report. Spins with a cooperative yield if the batch's
    /// fixed capacity is momentarily full.
    pub fn push(&self, report: Report) {
        let mut item = report;
        loop {
            match self.queue.push(item) {
                Ok(()) => return,
                Err(returned) => {
                    item = returned;
                    thread::yield_now();
                }
            }
        }
    }

    /// Marks the batch as complete. No further `push` calls should
    /// follow.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Drains every report, in push order, blocking until `close` has
    /// been called and the queue is empty.
    fn drain_into<W: Write>(&self, sink: &mut W) {
        loop {
            match self.queue.pop() {
                Some(report) => write_report(sink, &report),
                None => {
                    if self.closed.load(Ordering::Acquire) {
                        return;
                    }
                    thread::yield_now();
                }
            }
        }
    }
}

fn write_report<W: Write>(sink: &mut W, report: &Report) {
    let output_time = now_micros_since_epoch();
    let line = match report {
        Report::Add {
            side,
            order_id,
            instrument,
            price,
            count,
            input_time,
        } => format!(
            "{} {} {} {} {} {} {}\n",
            side, order_id, instrument, price, count, input_time, output_time
        ),
        Report::Execute {
            resting_id,
            active_id,
            execution_id,
            price,
            matched_count,
            input_time,
        } => format!(
            "E {} {} {} {} {} {} {}\n",
            resting_id, active_id, execution_id, price, matched_count, input_time, output_time
        ),
        Report::Cancel {
            order_id,
            accepted,
            input_time,
        } => format!(
            "X {} {} {} {}\n",
            order_id,
            if *accepted { 'A' } else { 'R' },
            input_time,
            output_time
        ),
    };
    let _ = sink.write_all(line.as_bytes());
}

/// The ordered queue of batches plus the printer fiber draining them.
///
/// `register()` is the only producer-facing entry point: it allocates a
/// batch, pushes it to the tail of the bus, and hands the caller back
/// the batch to fill. The MPSC bus-of-batches queue is a
/// `crossbeam_channel`: many operations across many OrderBooks
/// register batches concurrently, and exactly one printer drains them.
#[derive(Clone)]
pub struct ReportBus {
    sender: crossbeam_channel::Sender<Arc<ReportBatch>>,
}

impl ReportBus {
    /// Spawns the printer fiber writing formatted lines to `sink` and
    /// returns a handle producers use to register batches.
    pub fn spawn<W: Write + Send + 'static>(mut sink: W) -> (Self, thread::JoinHandle<()>) {
        let (sender, receiver) = crossbeam_channel::unbounded::<Arc<ReportBatch>>();

        let printer = thread::Builder::new()
            .name("report-printer".into())
            .spawn(move || {
                for batch in receiver.iter() {
                    batch.drain_into(&mut sink);
                }
                let _ = sink.flush();
            })
            .expect("failed to spawn report printer thread");

        (Self { sender }, printer)
    }

    /// Allocates a batch and enqueues it at the tail of the bus.
    ///
    /// The caller must hold whatever guard determines this operation's
    /// logical order *before* calling `register`, and must fill then
    /// close the returned batch promptly. The printer blocks on
    /// batches strictly in the order they were registered.
    pub fn register(&self) -> Arc<ReportBatch> {
        let batch = Arc::new(ReportBatch::new());
        // An unbounded bus never blocks here; a full bus would otherwise
        // be a deadlock risk if `register` were called while holding a
        // lock the printer itself could need.
        let _ = self.sender.send(batch.clone());
        batch
    }
}
