use ringseq_rs::{
    BatchEventProcessor, Config, EventHandler, EventProcessor, Executor, HandlerError,
    LoggingExceptionHandler, ProducerType, RingBuffer, SleepingWaitStrategy, ThreadExecutor,
    WorkHandler, WorkerPool,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// A fixed-size order record, reused in place for every sequence.
#[derive(Debug, Default)]
struct Order {
    id: u64,
    quantity: u64,
    price: u64,
}

/// Stage 1: sees every order, keeps a running checksum.
struct Journal {
    checksum: Arc<AtomicU64>,
    batches: u64,
}

impl EventHandler<Order> for Journal {
    fn on_event(&mut self, order: &Order, _: i64, end_of_batch: bool) -> Result<(), HandlerError> {
        self.checksum.fetch_xor(order.id.wrapping_mul(order.price), Ordering::Relaxed);
        if end_of_batch {
            self.batches += 1;
        }
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        println!("  Journal saw {} batches", self.batches);
        Ok(())
    }
}

/// Stage 2: competing workers, each order settled by exactly one of them.
struct Settlement {
    notional: Arc<AtomicU64>,
    settled: Arc<AtomicU64>,
}

impl WorkHandler<Order> for Settlement {
    fn on_event(&mut self, order: &Order, _: i64) -> Result<(), HandlerError> {
        self.notional
            .fetch_add(order.quantity * order.price, Ordering::Relaxed);
        self.settled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn main() {
    println!("RingSeq Pipeline Example");
    println!("========================\n");

    const N_PRODUCERS: u64 = 2;
    const ORDERS_PER_PRODUCER: u64 = 500_000;
    const N_WORKERS: usize = 3;

    let config = Config::new(4096, ProducerType::Multi);
    let ring = Arc::new(
        RingBuffer::new(
            config,
            Order::default,
            Arc::new(SleepingWaitStrategy::new()),
        )
        .expect("4096 is a power of two"),
    );

    println!("Configuration:");
    println!("  Ring size: {} slots", ring.buffer_size());
    println!("  Producers: {}", N_PRODUCERS);
    println!("  Settlement workers: {}", N_WORKERS);
    println!("  Total orders: {}\n", N_PRODUCERS * ORDERS_PER_PRODUCER);

    let checksum = Arc::new(AtomicU64::new(0));
    let journal = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Journal {
            checksum: Arc::clone(&checksum),
            batches: 0,
        },
    ));

    let notional = Arc::new(AtomicU64::new(0));
    let settled = Arc::new(AtomicU64::new(0));
    let settlement = WorkerPool::new(
        Arc::clone(&ring),
        ring.new_barrier(&[Arc::clone(journal.sequence())]),
        Arc::new(LoggingExceptionHandler),
        (0..N_WORKERS)
            .map(|_| Settlement {
                notional: Arc::clone(&notional),
                settled: Arc::clone(&settled),
            })
            .collect(),
    );
    // The pool trails the journal, so the journal need not gate producers.
    ring.remove_gating_sequence(journal.sequence());

    let executor = ThreadExecutor::new("pipeline");
    let runner = Arc::clone(&journal);
    executor
        .execute(Box::new(move || {
            if let Err(e) = runner.run() {
                eprintln!("journal failed to start: {}", e);
            }
        }))
        .expect("failed to start journal thread");
    settlement
        .start(&executor)
        .expect("failed to start settlement workers");

    let start = Instant::now();

    let producers: Vec<_> = (0..N_PRODUCERS)
        .map(|producer| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..ORDERS_PER_PRODUCER {
                    ring.publish_event(|order, _| {
                        order.id = producer * ORDERS_PER_PRODUCER + i;
                        order.quantity = 1 + i % 10;
                        order.price = 100 + i % 7;
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    settlement.drain_and_halt();
    journal.halt();
    if executor.join_all().is_err() {
        eprintln!("a pipeline thread panicked");
    }
    let duration = start.elapsed();

    let total = settled.load(Ordering::Relaxed);
    println!("\nResults:");
    println!("  Orders settled: {}", total);
    println!("  Notional: {}", notional.load(Ordering::Relaxed));
    println!("  Journal checksum: {:#018x}", checksum.load(Ordering::Relaxed));
    println!("  Duration: {:.2?}", duration);
    println!(
        "  Throughput: {:.2} million orders/sec",
        total as f64 / duration.as_secs_f64() / 1_000_000.0
    );
}
