use parking_lot::Mutex;
use ringseq_rs::{
    BatchEventProcessor, BlockingWaitStrategy, EventHandler, EventProcessor, HandlerError,
    RingBuffer, Sequence, YieldingWaitStrategy,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Spins until `sequence` reaches `target` or `timeout` passes.
fn wait_until_reaches(sequence: &Sequence, target: i64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while sequence.get() < target {
        if Instant::now() > deadline {
            return false;
        }
        thread::yield_now();
    }
    true
}

/// Records `(value, sequence, end_of_batch)` and, on each event, the value
/// its own processor sequence had at that moment.
struct Recorder {
    seen: Arc<Mutex<Vec<(i64, i64, bool)>>>,
    sequence_at_event: Arc<Mutex<Vec<i64>>>,
    own_sequence: Option<Arc<Sequence>>,
}

impl EventHandler<i64> for Recorder {
    fn on_event(
        &mut self,
        event: &i64,
        sequence: i64,
        end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        self.seen.lock().push((*event, sequence, end_of_batch));
        if let Some(own) = &self.own_sequence {
            self.sequence_at_event.lock().push(own.get());
        }
        Ok(())
    }

    fn set_sequence_callback(&mut self, sequence: Arc<Sequence>) {
        self.own_sequence = Some(sequence);
    }
}

#[test]
fn test_four_slot_scenario() {
    let ring = Arc::new(
        RingBuffer::single_producer(4, || -1i64, Arc::new(BlockingWaitStrategy::new())).unwrap(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sequence_at_event = Arc::new(Mutex::new(Vec::new()));
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Recorder {
            seen: Arc::clone(&seen),
            sequence_at_event: Arc::clone(&sequence_at_event),
            own_sequence: None,
        },
    ));

    for _ in 0..4 {
        ring.publish_event(|slot, sequence| *slot = sequence);
    }
    assert_eq!(ring.remaining_capacity(), 0);

    // The consumer has not moved, so the fifth claim must wait for it.
    let fifth_claimed = Arc::new(AtomicBool::new(false));
    let producer = {
        let ring = Arc::clone(&ring);
        let fifth_claimed = Arc::clone(&fifth_claimed);
        thread::spawn(move || {
            let sequence = ring.next();
            fifth_claimed.store(true, Ordering::SeqCst);
            // SAFETY: `sequence` was claimed by this thread and not yet published.
            unsafe { *ring.get_mut(sequence) = sequence };
            ring.publish(sequence);
            sequence
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!fifth_claimed.load(Ordering::SeqCst), "claim overtook the consumer");

    let runner = Arc::clone(&processor);
    let consumer = thread::spawn(move || runner.run());

    assert_eq!(producer.join().unwrap(), 4);
    assert!(wait_until_reaches(processor.sequence(), 4, Duration::from_secs(5)));
    processor.halt();
    consumer.join().unwrap().unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (0, 0, false),
            (1, 1, false),
            (2, 2, false),
            (3, 3, true),
            (4, 4, true)
        ]
    );
    // The batch 0..=3 is committed as a whole before event 4 is dispatched.
    assert_eq!(*sequence_at_event.lock(), vec![-1, -1, -1, -1, 3]);
}

/// Counts events and flags any that arrive out of order or stale.
struct OrderChecker {
    expected: i64,
    violations: Arc<AtomicUsize>,
    count: Arc<AtomicI64>,
}

impl EventHandler<i64> for OrderChecker {
    fn on_event(&mut self, event: &i64, sequence: i64, _: bool) -> Result<(), HandlerError> {
        if sequence != self.expected || *event != sequence {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
        self.expected = sequence + 1;
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_single_producer_in_order_no_gaps() {
    const N: i64 = 100_000;

    let ring = Arc::new(
        RingBuffer::single_producer(64, || -1i64, Arc::new(YieldingWaitStrategy::new())).unwrap(),
    );
    let violations = Arc::new(AtomicUsize::new(0));
    let count = Arc::new(AtomicI64::new(0));
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        OrderChecker {
            expected: 0,
            violations: Arc::clone(&violations),
            count: Arc::clone(&count),
        },
    ));

    let runner = Arc::clone(&processor);
    let consumer = thread::spawn(move || runner.run());

    let producer_ring = Arc::clone(&ring);
    let producer = thread::spawn(move || {
        for _ in 0..N {
            producer_ring.publish_event(|slot, sequence| *slot = sequence);
        }
    });

    producer.join().unwrap();
    assert!(wait_until_reaches(processor.sequence(), N - 1, Duration::from_secs(10)));
    processor.halt();
    consumer.join().unwrap().unwrap();

    assert_eq!(violations.load(Ordering::Relaxed), 0);
    assert_eq!(count.load(Ordering::Relaxed), N);
}

#[derive(Clone, Copy)]
struct Stamped {
    producer: usize,
    value: u64,
    sequence: i64,
}

/// Checks that every slot it is handed was written for that sequence, and
/// that each producer's values arrive in order.
struct GapChecker {
    last_per_producer: Vec<Option<u64>>,
    stale: Arc<AtomicUsize>,
    reordered: Arc<AtomicUsize>,
}

impl EventHandler<Stamped> for GapChecker {
    fn on_event(&mut self, event: &Stamped, sequence: i64, _: bool) -> Result<(), HandlerError> {
        if event.sequence != sequence {
            self.stale.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let last = &mut self.last_per_producer[event.producer];
        if last.is_some_and(|previous| event.value <= previous) {
            self.reordered.fetch_add(1, Ordering::Relaxed);
        }
        *last = Some(event.value);
        Ok(())
    }
}

#[test]
fn test_multi_producer_never_exposes_gap() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 20_000;

    let ring = Arc::new(
        RingBuffer::multi_producer(
            128,
            || Stamped {
                producer: 0,
                value: 0,
                sequence: -1,
            },
            Arc::new(YieldingWaitStrategy::new()),
        )
        .unwrap(),
    );
    let stale = Arc::new(AtomicUsize::new(0));
    let reordered = Arc::new(AtomicUsize::new(0));
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        GapChecker {
            last_per_producer: vec![None; PRODUCERS],
            stale: Arc::clone(&stale),
            reordered: Arc::clone(&reordered),
        },
    ));

    let runner = Arc::clone(&processor);
    let consumer = thread::spawn(move || runner.run());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut value = 0;
                let mut round = 0u64;
                while value < PER_PRODUCER {
                    // Mix single and batched claims so publication lands out of order.
                    let n = if round % 2 == 0 { 3.min(PER_PRODUCER - value) } else { 1 };
                    round += 1;
                    let mut claim = ring.claim_n(n as usize).unwrap();
                    claim.for_each_mut(|slot, sequence| {
                        *slot = Stamped {
                            producer,
                            value,
                            sequence,
                        };
                        value += 1;
                    });
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let total = (PRODUCERS as u64 * PER_PRODUCER) as i64;
    assert!(wait_until_reaches(processor.sequence(), total - 1, Duration::from_secs(10)));
    processor.halt();
    consumer.join().unwrap().unwrap();

    assert_eq!(ring.cursor(), total - 1);
    assert_eq!(stale.load(Ordering::Relaxed), 0, "consumer read an unpublished slot");
    assert_eq!(reordered.load(Ordering::Relaxed), 0);
}

/// Second stage of a chain: checks the first stage is always ahead.
struct Downstream {
    upstream: Arc<Sequence>,
    overtaken: Arc<AtomicUsize>,
}

impl EventHandler<i64> for Downstream {
    fn on_event(&mut self, _: &i64, sequence: i64, _: bool) -> Result<(), HandlerError> {
        if self.upstream.get() < sequence {
            self.overtaken.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

struct Slow;

impl EventHandler<i64> for Slow {
    fn on_event(&mut self, _: &i64, sequence: i64, _: bool) -> Result<(), HandlerError> {
        if sequence % 256 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

#[test]
fn test_dependency_chain_never_overtakes() {
    const N: i64 = 20_000;

    let ring = Arc::new(
        RingBuffer::single_producer(32, || 0i64, Arc::new(BlockingWaitStrategy::new())).unwrap(),
    );
    let first = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Slow,
    ));
    let overtaken = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[Arc::clone(first.sequence())]),
        Downstream {
            upstream: Arc::clone(first.sequence()),
            overtaken: Arc::clone(&overtaken),
        },
    ));

    // Once the tail of the chain is gating, the head no longer needs to.
    assert!(ring.remove_gating_sequence(first.sequence()));

    let handles: Vec<_> = [
        Arc::clone(&first) as Arc<dyn EventProcessor>,
        Arc::clone(&second) as Arc<dyn EventProcessor>,
    ]
    .into_iter()
    .map(|processor| thread::spawn(move || processor.run()))
    .collect();

    for value in 0..N {
        ring.publish_event(|slot, _| *slot = value);
    }

    assert!(wait_until_reaches(second.sequence(), N - 1, Duration::from_secs(30)));
    assert!(first.sequence().get() >= second.sequence().get());
    first.halt();
    second.halt();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(overtaken.load(Ordering::Relaxed), 0);
}

/// Counts lifecycle calls across runs.
struct Lifecycle {
    events: Arc<AtomicI64>,
    starts: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl EventHandler<i64> for Lifecycle {
    fn on_event(&mut self, _: &i64, _: i64, _: bool) -> Result<(), HandlerError> {
        self.events.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), HandlerError> {
        self.starts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_halt_and_restart_resumes_where_it_stopped() {
    let ring = Arc::new(
        RingBuffer::single_producer(16, || 0i64, Arc::new(BlockingWaitStrategy::new())).unwrap(),
    );
    let events = Arc::new(AtomicI64::new(0));
    let starts = Arc::new(AtomicUsize::new(0));
    let shutdowns = Arc::new(AtomicUsize::new(0));
    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Lifecycle {
            events: Arc::clone(&events),
            starts: Arc::clone(&starts),
            shutdowns: Arc::clone(&shutdowns),
        },
    ));

    for round in 1..=3i64 {
        let runner = Arc::clone(&processor);
        let handle = thread::spawn(move || runner.run());

        for value in 0..10 {
            ring.publish_event(|slot, _| *slot = value);
        }
        assert!(wait_until_reaches(
            processor.sequence(),
            round * 10 - 1,
            Duration::from_secs(5)
        ));

        processor.halt();
        handle.join().unwrap().unwrap();
        assert!(!processor.is_running());
    }

    assert_eq!(events.load(Ordering::Relaxed), 30);
    assert_eq!(starts.load(Ordering::Relaxed), 3);
    assert_eq!(shutdowns.load(Ordering::Relaxed), 3);
}
