//! Engine performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use commodity_book::audit::InMemoryAuditSink;
use commodity_book::engine::Engine;
use commodity_book::persistence::InMemoryPersistence;
use commodity_book::types::{CommodityId, CustomerId, OrderId, Side};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::runtime::Runtime;

async fn new_engine_with_commodity() -> (Engine, CommodityId) {
    let persistence = Arc::new(InMemoryPersistence::new());
    let commodity = persistence.create_commodity("Gold", "XAU", None).await.unwrap();
    let engine = Engine::new(persistence, Arc::new(InMemoryAuditSink::new()));
    (engine, commodity.id)
}

fn bench_submit_non_crossing_throughput(c: &mut Criterion) {
    const N: u64 = 1000;
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(N));
    group.bench_function("submit_non_crossing_1000", |b| {
        b.to_async(&rt).iter_batched(
            || rt.block_on(new_engine_with_commodity()),
            |(engine, commodity_id)| async move {
                for i in 0..N {
                    engine
                        .submit(CustomerId(i as i64), commodity_id, Side::Buy, Decimal::from(100 - (i % 50) as i64), Decimal::from(10))
                        .await
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_submit_crossing_throughput(c: &mut Criterion) {
    const N: u64 = 1000;
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(N));
    group.bench_function("submit_crossing_1000", |b| {
        b.to_async(&rt).iter_batched(
            || {
                rt.block_on(async {
                    let (engine, commodity_id) = new_engine_with_commodity().await;
                    for i in 0..N {
                        engine
                            .submit(CustomerId(i as i64), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(1))
                            .await
                            .unwrap();
                    }
                    (engine, commodity_id)
                })
            },
            |(engine, commodity_id)| async move {
                engine
                    .submit(CustomerId(999_999), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(N))
                    .await
                    .unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_cancel_order(c: &mut Criterion) {
    const RESTING: u64 = 500;
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(RESTING));
    group.bench_function("cancel_500_resting", |b| {
        b.to_async(&rt).iter_batched(
            || {
                rt.block_on(async {
                    let (engine, commodity_id) = new_engine_with_commodity().await;
                    let mut ids: Vec<(CustomerId, OrderId)> = Vec::with_capacity(RESTING as usize);
                    for i in 0..RESTING {
                        let outcome = engine
                            .submit(CustomerId(i as i64), commodity_id, Side::Buy, Decimal::from(50 + i as i64), Decimal::from(1))
                            .await
                            .unwrap();
                        ids.push((CustomerId(i as i64), outcome.order.id));
                    }
                    (engine, ids)
                })
            },
            |(engine, ids)| async move {
                for (customer_id, order_id) in ids {
                    engine.cancel(customer_id, order_id).await.unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_submit_non_crossing_throughput, bench_submit_crossing_throughput, bench_cancel_order);
criterion_main!(benches);
