//! Benchmark for the volume registry
//!
//! Attach, confirm and detach throughput on a single volume and across
//! concurrent callers.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use volume_tracker::tracker::{PeerAttributes, VolumeRegistry, VolumeTree};

fn bench_attach_peers(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_registry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("attach_by_host", |b| {
        let registry = VolumeRegistry::new();
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let host = format!("host-{}.local", counter);
            let _ = registry.get_parents(black_box("vol-1"), None, Some(host.as_str()));
        });
    });

    group.finish();
}

fn bench_confirm_peers(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_registry");
    group.throughput(Throughput::Elements(1));

    // Pre-attach peers
    let registry = VolumeRegistry::new();
    let peers: Vec<String> = (0..1000)
        .filter_map(|i| {
            registry
                .get_parents("vol-1", None, Some(format!("host-{}.local", i).as_str()))
                .ok()
                .map(|r| r.peer_id.to_string())
        })
        .collect();

    group.bench_function("add_metadata", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            counter += 1;
            let peer_id = &peers[counter % peers.len()];
            let _ = registry.add_metadata(
                black_box("vol-1"),
                Some(peer_id.as_str()),
                PeerAttributes::default().with_port(3260),
            );
        });
    });

    group.finish();
}

fn bench_tree_insert_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_tree");
    group.throughput(Throughput::Elements(1));

    let mut tree = VolumeTree::new("vol-1");
    for i in 0..1000 {
        let _ = tree.insert_by_peer_id(format!("peer-{:04}", i));
    }

    group.bench_function("insert_then_remove", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let peer_id = format!("churn-{}", counter);
            if tree.insert_by_peer_id(peer_id.clone()).is_ok() {
                let _ = tree.remove_by_peer_id(&peer_id.into());
            }
        });
    });

    group.finish();
}

fn bench_concurrent_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_registry");
    group.throughput(Throughput::Elements(100));

    let registry = VolumeRegistry::new();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut round = 0u64;

    group.bench_function("concurrent_100_attachments", |b| {
        b.iter(|| {
            round += 1;
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let reg = registry.clone();
                    let volume_id = format!("vol-{}", i % 8);
                    let host = format!("host-{}-{}.local", round, i);
                    handles.push(tokio::spawn(async move {
                        let _ = reg.get_parents(&volume_id, None, Some(host.as_str()));
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_attach_peers,
    bench_confirm_peers,
    bench_tree_insert_remove,
    bench_concurrent_attach,
);
criterion_main!(benches);
