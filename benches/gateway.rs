//! Benchmarks for gateway hot paths.
//!
//! Run with: cargo bench --bench gateway

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use smssyncd::account::AccountContext;
use smssyncd::msginfo;
use smssyncd::msisdn;
use smssyncd::queue::{OutboundQueues, QueuedOutbound};

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("msisdn/normalize");

    group.bench_function("already_international", |b| {
        b.iter(|| black_box(msisdn::normalize(black_box("+27831234567"), "+27")))
    });

    group.bench_function("trunk_prefix", |b| {
        b.iter(|| black_box(msisdn::normalize(black_box("0831234567"), "+27")))
    });

    group.bench_function("international_access", |b| {
        b.iter(|| black_box(msisdn::normalize(black_box("0027831234567"), "+27")))
    });

    group.bench_function("shortcode", |b| {
        b.iter(|| black_box(msisdn::normalize(black_box("555"), "+27")))
    });

    group.bench_function("messy_separators", |b| {
        b.iter(|| black_box(msisdn::normalize(black_box("(083) 123-4567"), "+27")))
    });

    group.finish();
}

fn bench_msginfo(c: &mut Criterion) {
    let mut group = c.benchmark_group("msginfo/codec");

    let context = AccountContext::new("account1", "topsecret", "+27");

    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut metadata = serde_json::Map::new();
            msginfo::encode(&context, &mut metadata);
            black_box(metadata)
        })
    });

    group.bench_function("decode", |b| {
        let mut metadata = serde_json::Map::new();
        msginfo::encode(&context, &mut metadata);

        b.iter(|| black_box(msginfo::decode(&metadata).unwrap()))
    });

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    group.bench_function("route_and_drain", |b| {
        let queues = OutboundQueues::new(100_000);
        b.iter(|| {
            queues.route(
                "account1",
                None,
                QueuedOutbound::new("+27831234567", "hello", "id-1"),
            );
            black_box(queues.drain("account1"))
        })
    });

    group.bench_function("window_capture", |b| {
        let queues = OutboundQueues::new(100_000);
        b.iter(|| {
            queues.open_window("inbound-1", "account1");
            queues.route(
                "account1",
                Some("inbound-1"),
                QueuedOutbound::new("+27831234567", "pong", "id-1"),
            );
            black_box(queues.close_window("inbound-1"))
        })
    });

    group.finish();
}

fn bench_drain_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue/drain_throughput");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let queues = OutboundQueues::new(100_000);
                b.iter(|| {
                    for i in 0..batch_size {
                        queues.route(
                            "account1",
                            None,
                            QueuedOutbound::new("+27831234567", "hello", format!("id-{}", i)),
                        );
                    }
                    black_box(queues.drain("account1"))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_msginfo,
    bench_queue,
    bench_drain_throughput,
);

criterion_main!(benches);
