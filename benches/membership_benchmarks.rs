use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rumor::gossip::Message;
use rumor::membership::{Membership, Node, NodeState};
use std::hint::black_box;

fn cluster(size: u16, last_updated: u64) -> Vec<Node> {
    (0..size)
        .map(|i| Node {
            address: format!("10.0.{}.{}:7946", i / 256, i % 256),
            state: NodeState::Alive,
            last_updated,
            payload: format!("payload-{}", i).into_bytes(),
        })
        .collect()
}

fn benchmark_merge_fresh(c: &mut Criterion) {
    let snapshot = cluster(256, 1_000);

    c.bench_function("merge_256_into_empty", |b| {
        b.iter_batched(
            || (Membership::new(), snapshot.clone()),
            |(membership, nodes)| black_box(membership.merge(nodes)),
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_merge_stale(c: &mut Criterion) {
    let membership = Membership::new();
    membership.merge(cluster(256, 2_000));
    let stale = cluster(256, 1_000);

    c.bench_function("merge_256_stale", |b| {
        b.iter_batched(
            || stale.clone(),
            |nodes| black_box(membership.merge(nodes)),
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_sync_codec(c: &mut Criterion) {
    let snapshot = cluster(256, 1_000);
    let frame = Message::sync(&snapshot).unwrap().encode().unwrap();

    c.bench_function("sync_encode_256", |b| {
        b.iter(|| black_box(Message::sync(&snapshot).unwrap().encode().unwrap()))
    });

    c.bench_function("sync_decode_256", |b| {
        b.iter(|| black_box(Message::decode(&frame).unwrap().nodes().unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_merge_fresh,
    benchmark_merge_stale,
    benchmark_sync_codec
);
criterion_main!(benches);
