//! RingSeq - Sequenced Ring Buffer for Inter-Thread Messaging
//!
//! A pre-allocated ring of events coordinated entirely by 64-bit sequence
//! numbers. Producers claim sequences from a sequencer, fill the slots in
//! place and publish them; consumers wait on a barrier for published
//! sequences and record their progress in sequences of their own, which in
//! turn gate the producers.
//!
//! # Key Features
//!
//! - Single- and multi-producer sequencers (plain store vs. CAS claim with
//!   per-slot lap tags, so out-of-order publication never exposes a gap)
//! - Every hot counter on its own cache line
//! - Pluggable wait strategies, from busy spin to condvar blocking
//! - Batch event processors with dependency chains, competing-consumer
//!   worker pools and a non-blocking poller
//! - Zero allocation per event: slots are built once and reused
//!
//! # Example
//!
//! ```
//! use ringseq_rs::{
//!     BatchEventProcessor, BlockingWaitStrategy, EventHandler, EventProcessor, HandlerError,
//!     RingBuffer,
//! };
//! use std::sync::Arc;
//! use std::thread;
//!
//! struct Sum(Arc<std::sync::atomic::AtomicI64>);
//!
//! impl EventHandler<i64> for Sum {
//!     fn on_event(&mut self, event: &i64, _: i64, _: bool) -> Result<(), HandlerError> {
//!         self.0.fetch_add(*event, std::sync::atomic::Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! let ring = Arc::new(
//!     RingBuffer::single_producer(1024, || 0i64, Arc::new(BlockingWaitStrategy::new())).unwrap(),
//! );
//! let total = Arc::new(std::sync::atomic::AtomicI64::new(0));
//! let processor = Arc::new(BatchEventProcessor::new(
//!     Arc::clone(&ring),
//!     ring.new_barrier(&[]),
//!     Sum(Arc::clone(&total)),
//! ));
//!
//! let runner = Arc::clone(&processor);
//! let handle = thread::spawn(move || runner.run());
//!
//! for value in 1..=100 {
//!     ring.publish_event(|slot, _| *slot = value);
//! }
//!
//! while processor.sequence().get() < 99 {
//!     thread::yield_now();
//! }
//! processor.halt();
//! handle.join().unwrap().unwrap();
//! assert_eq!(total.load(std::sync::atomic::Ordering::Relaxed), 5050);
//! ```

mod backoff;
mod barrier;
mod claim;
mod config;
mod error;
mod executor;
mod handler;
mod invariants;
mod poller;
mod processor;
mod ring_buffer;
mod sequence;
mod sequence_group;
mod sequencer;
mod wait_strategy;
mod work;

pub use backoff::Backoff;
pub use barrier::SequenceBarrier;
pub use claim::Claim;
pub use config::{Config, ProducerType, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{ClaimError, ConfigError, HandlerError, PoolError, ProcessorError, WaitError};
pub use executor::{Executor, Task, ThreadExecutor};
pub use handler::{
    EventHandler, ExceptionHandler, IgnoreExceptionHandler, LoggingExceptionHandler, WorkHandler,
};
pub use poller::{EventPoller, PollState};
pub use processor::{BatchEventProcessor, EventProcessor};
pub use ring_buffer::RingBuffer;
pub use sequence::{minimum_sequence, GatingSequence, Sequence, INITIAL_CURSOR_VALUE};
pub use sequence_group::{FixedSequenceGroup, SequenceGroup};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, LiteBlockingWaitStrategy,
    LiteTimeoutBlockingWaitStrategy, PhasedBackoffWaitStrategy, SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
pub use work::{WorkProcessor, WorkerPool};
