//! Compares the performance of the channel flavors available to back a `SequentialMerge`'s
//! per-source buffers -- `reactive-mutiny`'s movable channels (through this crate's aliases)
//! against Tokio's MPSC, which would be the "obvious" choice.
//!
//! # Analysis 2024-05-10
//!
//!   `reactive-mutiny`'s Atomic wins the latency & throughput contests on the CPUs tried so
//!   far (Intel & AMD), with FullSync close behind and Crossbeam trailing on high contention.
//!
//! Out of the results here, it was decided that the Atomic channel is the default for
//! [reactive_merging::prelude::Channels] -- and is what `new_sequential_merge!()` resolves to.
//!

use criterion::{
    criterion_group,
    criterion_main,
    black_box,
    Criterion,
    BenchmarkGroup,
    measurement::WallTime,
};
use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        Ordering::Relaxed,
    },
};
use once_cell::sync::Lazy;
use reactive_mutiny::prelude::{ChannelCommon, ChannelUni, ChannelProducer};
use tokio_stream::StreamExt;
use reactive_merging::prelude::*;


/// Represents a reasonably sized item, similar to production needs
#[derive(Debug)]
struct ItemType {
    _data:  [u8; 128],
}
impl Default for ItemType {
    fn default() -> Self {
        ItemType { _data: [0; 128] }
    }
}

const BUFFER_SIZE: usize = 1<<14;

/// The tokio runtime driving the end-to-end merge benchmarks
static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(||
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("couldn't build the benchmarks' tokio Runtime"));


/// Benchmarks the same-thread latency, which is measured by the time it takes to send a single element + time to receive that one element
fn bench_same_thread_latency(criterion: &mut Criterion) {

    let mut group = criterion.benchmark_group("Same-thread buffer LATENCY");

    let atomic_channel = AtomicMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut atomic_stream, _) = atomic_channel.create_stream();
    let atomic_sender = atomic_channel;

    let fullsync_channel = FullSyncMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut fullsync_stream, _) = fullsync_channel.create_stream();
    let fullsync_sender = fullsync_channel;

    let crossbeam_channel = CrossbeamMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut crossbeam_stream, _) = crossbeam_channel.create_stream();
    let crossbeam_sender = crossbeam_channel;

    let (tokio_sender, tokio_receiver) = tokio::sync::mpsc::channel::<ItemType>(BUFFER_SIZE);
    let mut tokio_stream = tokio_stream::wrappers::ReceiverStream::new(tokio_receiver);

    let bench_id = format!("reactive-mutiny's Atomic buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        while !atomic_sender.try_send(|slot| *slot = ItemType::default()) {}
        while futures::executor::block_on(atomic_stream.next()).is_none() {}
    }));

    let bench_id = format!("reactive-mutiny's FullSync buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        while !fullsync_sender.try_send(|slot| *slot = ItemType::default()) {}
        while futures::executor::block_on(fullsync_stream.next()).is_none() {}
    }));

    let bench_id = format!("reactive-mutiny's Crossbeam buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        while !crossbeam_sender.try_send(|slot| *slot = ItemType::default()) {}
        while futures::executor::block_on(crossbeam_stream.next()).is_none() {}
    }));

    let bench_id = format!("Tokio MPSC buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        while tokio_sender.try_send(ItemType::default()).is_err() {}
        while futures::executor::block_on(tokio_stream.next()).is_none() {}
    }));

    group.finish();
}

/// Benchmarks the same-thread throughput, which is measured by the time it takes to fill the backing buffer with elements + the time to receive all of them
fn bench_same_thread_throughput(criterion: &mut Criterion) {

    let mut group = criterion.benchmark_group("Same-thread buffer THROUGHPUT");

    let atomic_channel = AtomicMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut atomic_stream, _) = atomic_channel.create_stream();
    let atomic_sender = atomic_channel;

    let fullsync_channel = FullSyncMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut fullsync_stream, _) = fullsync_channel.create_stream();
    let fullsync_sender = fullsync_channel;

    let crossbeam_channel = CrossbeamMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut crossbeam_stream, _) = crossbeam_channel.create_stream();
    let crossbeam_sender = crossbeam_channel;

    let (tokio_sender, tokio_receiver) = tokio::sync::mpsc::channel::<ItemType>(BUFFER_SIZE);
    let mut tokio_stream = tokio_stream::wrappers::ReceiverStream::new(tokio_receiver);

    let bench_id = format!("reactive-mutiny's Atomic buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        for _ in 0..BUFFER_SIZE {
            while !atomic_sender.try_send(|slot| *slot = ItemType::default()) {};
        }
        for _ in 0..BUFFER_SIZE {
            while futures::executor::block_on(atomic_stream.next()).is_none() {};
        }
    }));

    let bench_id = format!("reactive-mutiny's FullSync buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        for _ in 0..BUFFER_SIZE {
            while !fullsync_sender.try_send(|slot| *slot = ItemType::default()) {};
        }
        for _ in 0..BUFFER_SIZE {
            while futures::executor::block_on(fullsync_stream.next()).is_none() {};
        }
    }));

    let bench_id = format!("reactive-mutiny's Crossbeam buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        for _ in 0..BUFFER_SIZE {
            while !crossbeam_sender.try_send(|slot| *slot = ItemType::default()) {};
        }
        for _ in 0..BUFFER_SIZE {
            while futures::executor::block_on(crossbeam_stream.next()).is_none() {};
        }
    }));

    let bench_id = format!("Tokio MPSC buffer");
    group.bench_function(bench_id, |bencher| bencher.iter(|| {
        for _ in 0..BUFFER_SIZE {
            while tokio_sender.try_send(ItemType::default()).is_err() {};
        }
        for _ in 0..BUFFER_SIZE {
            while futures::executor::block_on(tokio_stream.next()).is_none() {};
        }
    }));

    group.finish();
}

/// Benchmarks the inter-thread throughput, which is measured by the receiver thread, which consumes the events that are produced -- non-stop --
/// by the producer thread, simulating a source flooding its buffer while the merged output lags behind.
fn bench_inter_thread_throughput(criterion: &mut Criterion) {

    let mut group = criterion.benchmark_group("Inter-thread buffer THROUGHPUT");

    let atomic_channel = AtomicMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut atomic_stream, _) = atomic_channel.create_stream();
    let atomic_sender = atomic_channel;

    let fullsync_channel = FullSyncMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut fullsync_stream, _) = fullsync_channel.create_stream();
    let fullsync_sender = fullsync_channel;

    let crossbeam_channel = CrossbeamMergeChannel::<ItemType, BUFFER_SIZE>::new("ItemType buffer for benchmarks");
    let (mut crossbeam_stream, _) = crossbeam_channel.create_stream();
    let crossbeam_sender = crossbeam_channel;

    let (tokio_sender, tokio_receiver) = tokio::sync::mpsc::channel::<ItemType>(BUFFER_SIZE);
    let mut tokio_stream = tokio_stream::wrappers::ReceiverStream::new(tokio_receiver);

    fn bench_it(group:          &mut BenchmarkGroup<WallTime>,
                bench_id:       String,
                mut send_fn:    impl FnMut() + Send,
                mut receive_fn: impl FnMut()) {
        crossbeam::scope(move |scope| {
            let keep_running = Arc::new(AtomicBool::new(true));
            let keep_running_ref = keep_running.clone();
            scope.spawn(move |_| {
                while keep_running.load(Relaxed) {
                    send_fn();
                }
            });
            group.bench_function(bench_id, |bencher| bencher.iter(|| {
                receive_fn();
            }));
            keep_running_ref.store(false, Relaxed);
        }).expect("Spawn benchmarking threads");
    }

    bench_it(&mut group,
             format!("reactive-mutiny's Atomic buffer"),
             || for _ in 0..BUFFER_SIZE {
                            if !atomic_sender.try_send(|slot| *slot = ItemType::default()) {std::hint::spin_loop();std::hint::spin_loop();std::hint::spin_loop()}
                        },
             || for _ in 0..(BUFFER_SIZE>>5) { while futures::executor::block_on(atomic_stream.next()).is_none() {std::hint::spin_loop()} });

    bench_it(&mut group,
             format!("reactive-mutiny's FullSync buffer"),
             || for _ in 0..BUFFER_SIZE {
                            if !fullsync_sender.try_send(|slot| *slot = ItemType::default()) {std::hint::spin_loop();std::hint::spin_loop();std::hint::spin_loop()}
                        },
             || for _ in 0..(BUFFER_SIZE>>5) { while futures::executor::block_on(fullsync_stream.next()).is_none() {std::hint::spin_loop()} });

    bench_it(&mut group,
             format!("reactive-mutiny's Crossbeam buffer"),
             || for _ in 0..BUFFER_SIZE {
                            if !crossbeam_sender.try_send(|slot| *slot = ItemType::default()) {std::hint::spin_loop();std::hint::spin_loop();std::hint::spin_loop()}
                        },
             || for _ in 0..(BUFFER_SIZE>>5) { while futures::executor::block_on(crossbeam_stream.next()).is_none() {std::hint::spin_loop()} });

    bench_it(&mut group,
             format!("Tokio MPSC buffer"),
             || for _ in 0..BUFFER_SIZE {
                            if tokio_sender.try_send(ItemType::default()).is_err() {std::hint::spin_loop();std::hint::spin_loop();std::hint::spin_loop()};
                        },
             || for _ in 0..(BUFFER_SIZE>>5) { while futures::executor::block_on(tokio_stream.next()).is_none() {std::hint::spin_loop()} });

    group.finish();
}

/// Benchmarks the whole path users get out of the `new_*_sequential_merge!()` macros: several
/// flooding sources, eagerly relayed into their buffers, consumed in registration order
fn bench_merged_throughput(criterion: &mut Criterion) {

    let mut group = criterion.benchmark_group("End-to-end merged THROUGHPUT");

    const SOURCES: usize = 4;
    const ITEMS_PER_SOURCE: usize = 1<<10;
    const CONFIG: ConstConfig = ConstConfig {
        source_buffer:     1024,
        retrying_strategy: RetryingStrategies::RetryYieldingForUpToMillis(100),
        ..ConstConfig::default()
    };

    let bench_id = format!("reactive-mutiny's Atomic buffers");
    group.bench_function(bench_id, |bencher| bencher.iter(|| RUNTIME.block_on(async {
        let mut merge = new_atomic_sequential_merge!(CONFIG, "bench merge (atomic)", ItemType);
        for source_n in 0..SOURCES {
            merge.subscribe(format!("flood #{source_n}"), futures::stream::iter((0..ITEMS_PER_SOURCE).map(|_| ItemType::default())));
        }
        black_box(futures::StreamExt::count(merge.merged()).await);
    })));

    let bench_id = format!("reactive-mutiny's FullSync buffers");
    group.bench_function(bench_id, |bencher| bencher.iter(|| RUNTIME.block_on(async {
        let mut merge = new_fullsync_sequential_merge!(CONFIG, "bench merge (fullsync)", ItemType);
        for source_n in 0..SOURCES {
            merge.subscribe(format!("flood #{source_n}"), futures::stream::iter((0..ITEMS_PER_SOURCE).map(|_| ItemType::default())));
        }
        black_box(futures::StreamExt::count(merge.merged()).await);
    })));

    let bench_id = format!("reactive-mutiny's Crossbeam buffers");
    group.bench_function(bench_id, |bencher| bencher.iter(|| RUNTIME.block_on(async {
        let mut merge = new_crossbeam_sequential_merge!(CONFIG, "bench merge (crossbeam)", ItemType);
        for source_n in 0..SOURCES {
            merge.subscribe(format!("flood #{source_n}"), futures::stream::iter((0..ITEMS_PER_SOURCE).map(|_| ItemType::default())));
        }
        black_box(futures::StreamExt::count(merge.merged()).await);
    })));

    group.finish();
}

criterion_group!(benches, bench_same_thread_latency, bench_same_thread_throughput, bench_inter_thread_throughput, bench_merged_throughput);
criterion_main!(benches);
