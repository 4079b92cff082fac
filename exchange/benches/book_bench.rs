// Benchmarks for the order book's hot paths: resting insertion, a
// match walk against resting liquidity, and cancellation.

use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use exchange::book::{Book, BookSide};
use exchange::concurrent_index::ConcurrentIndex;
use exchange::model::{Instrument, Order, OrderId, RestingOrder};
use exchange::report::ReportBus;
use common::Side;

struct Discard;
impl Write for Discard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn order(id: OrderId, price: u32, count: u32) -> Order {
    Order::new(Side::Buy, id, price, count, Instrument::from("IBM"), id as u64, 1)
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_add");
    group.throughput(Throughput::Elements(1));

    group.bench_function("add_new_price_level", |b| {
        let book = Book::new(BookSide::Bid);
        let (bus, _printer) = ReportBus::spawn(Discard);
        let mut price = 1u32;
        b.iter(|| {
            let batch = bus.register();
            book.add(book.lock_head(), black_box(order(price, price, 10)), &batch);
            price += 1;
        });
    });

    group.bench_function("add_existing_price_level", |b| {
        let book = Book::new(BookSide::Bid);
        let (bus, _printer) = ReportBus::spawn(Discard);
        let mut id = 1u32;
        b.iter(|| {
            let batch = bus.register();
            book.add(book.lock_head(), black_box(order(id, 100, 10)), &batch);
            id += 1;
        });
    });

    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_match");

    for depth in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("walk_depth", depth), &depth, |b, &depth| {
            let (bus, _printer) = ReportBus::spawn(Discard);
            let index: ConcurrentIndex<OrderId, RestingOrder> = ConcurrentIndex::with_stripes(64);

            b.iter_batched(
                || {
                    // Fresh book each iteration: `match_order` consumes
                    // the resting liquidity it walks, so a steady-state
                    // "walk depth N" measurement needs to restock it.
                    let book = Book::new(BookSide::Ask);
                    for i in 0..depth {
                        let batch = bus.register();
                        book.add(book.lock_head(), order(1000 + i as u32, 50 + i as u32, 10), &batch);
                    }
                    book
                },
                |book| {
                    black_box(book.match_order(999_999, 50 + depth as u32, 1, 1, &bus, &index));
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_cancel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cancel_miss", |b| {
        let book = Book::new(BookSide::Bid);
        let (bus, _printer) = ReportBus::spawn(Discard);
        let batch = bus.register();
        book.add(book.lock_head(), order(1, 50, 10), &batch);

        b.iter(|| {
            black_box(book.cancel(book.lock_head(), 999_999, 50));
        });
    });
}

criterion_group!(benches, bench_add, bench_match, bench_cancel);
criterion_main!(benches);
