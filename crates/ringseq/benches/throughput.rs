use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringseq_rs::{
    BatchEventProcessor, BusySpinWaitStrategy, Config, EventHandler, EventProcessor, HandlerError,
    ProducerType, RingBuffer, YieldingWaitStrategy, HIGH_THROUGHPUT_CONFIG,
};
use std::sync::Arc;
use std::thread;

const MSG_PER_PRODUCER: u64 = 1_000_000; // 1M events per producer

struct Sink;

impl EventHandler<u64> for Sink {
    fn on_event(&mut self, event: &u64, _: i64, _: bool) -> Result<(), HandlerError> {
        black_box(event);
        Ok(())
    }
}

/// Runs one consumer over `producers * MSG_PER_PRODUCER` events, each
/// producer claiming `batch` slots at a time.
fn run_pipeline(config: Config, producers: u64, batch: usize) {
    let ring = Arc::new(
        RingBuffer::new(config, || 0u64, Arc::new(YieldingWaitStrategy::new())).unwrap(),
    );
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Sink,
    ));
    let runner = Arc::clone(&processor);
    let consumer = thread::spawn(move || runner.run());

    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut sent = 0u64;
                while sent < MSG_PER_PRODUCER {
                    let want = batch.min((MSG_PER_PRODUCER - sent) as usize);
                    let mut claim = ring.claim_n(want).unwrap();
                    claim.for_each_mut(|slot, sequence| *slot = sequence as u64);
                    sent += want as u64;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let last = (producers * MSG_PER_PRODUCER) as i64 - 1;
    while processor.sequence().get() < last {
        std::hint::spin_loop();
    }
    processor.halt();
    consumer.join().unwrap().unwrap();
}

fn bench_single_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_producer");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    group.bench_function("batch_processor", |b| {
        b.iter(|| run_pipeline(Config::single_producer(1 << 16), 1, 1));
    });

    group.bench_function("poller", |b| {
        b.iter(|| {
            let ring = Arc::new(
                RingBuffer::single_producer(1 << 16, || 0u64, Arc::new(BusySpinWaitStrategy::new()))
                    .unwrap(),
            );
            let poller = ring.new_poller(&[]);

            let producer_ring = Arc::clone(&ring);
            let producer = thread::spawn(move || {
                for value in 0..MSG_PER_PRODUCER {
                    producer_ring.publish_event(|slot, _| *slot = value);
                }
            });

            let mut received = 0u64;
            while received < MSG_PER_PRODUCER {
                poller
                    .poll(|event, _, _| {
                        black_box(event);
                        received += 1;
                        Ok(true)
                    })
                    .unwrap();
            }

            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_multi_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_producer");

    for producers in [2u64, 4].iter() {
        group.throughput(Throughput::Elements(MSG_PER_PRODUCER * producers));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}P_1C", producers)),
            producers,
            |b, &n| {
                b.iter(|| run_pipeline(Config::multi_producer(1 << 16), n, 1));
            },
        );
    }

    group.finish();
}

fn bench_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_sizes");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    for batch_size in [1usize, 16, 256, 4096].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("batch_{}", batch_size)),
            batch_size,
            |b, &batch| {
                b.iter(|| {
                    run_pipeline(
                        Config::new(HIGH_THROUGHPUT_CONFIG.buffer_size, ProducerType::Single),
                        1,
                        batch,
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_producer,
    bench_multi_producer,
    bench_batch_sizes
);
criterion_main!(benches);
