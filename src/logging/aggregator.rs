// SPDX-License-Identifier: Apache-2.0 OR MIT
// Multi-producer single-consumer aggregator
//
// Every producer owns one bounded ring channel. A drain cycle gathers all of
// them, optionally sorts the batch, and forwards it into one larger consumer
// channel that the sink side pulls from.

use super::entry::Timestamped;
use super::ringbuffer::{RingChannel, DEFAULT_CONSUMER_FACTOR, DEFAULT_PRODUCER_CAPACITY};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use thiserror::Error;

/// Default upper bound on the number of producer slots
pub const DEFAULT_MAX_PRODUCERS: usize = 1_024;

type Sorter<T> = Box<dyn Fn(&T, &T) -> CmpOrdering + Send + Sync>;

/// What a drain cycle does when the consumer channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerFullPolicy {
    /// Retry each push (with backoff) until the consumer makes room
    ///
    /// Requires someone else to be pulling concurrently, otherwise the
    /// drain never returns.
    #[default]
    Block,
    /// Stop at the first rejected push and hand the rest back to the caller
    Fail,
}

/// Sizing and policy for an [`Aggregator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub producer_capacity: usize,
    pub consumer_capacity: usize,
    pub max_producers: usize,
    pub consumer_full: ConsumerFullPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            producer_capacity: DEFAULT_PRODUCER_CAPACITY,
            consumer_capacity: DEFAULT_PRODUCER_CAPACITY * DEFAULT_CONSUMER_FACTOR,
            max_producers: DEFAULT_MAX_PRODUCERS,
            consumer_full: ConsumerFullPolicy::Block,
        }
    }
}

/// Failure to create a producer slot
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("producer limit of {limit} reached")]
    ProducerLimit { limit: usize },
    #[error("no producer at index {index}")]
    UnknownProducer { index: usize },
}

/// Rejected [`Aggregator::add`]; the item is always handed back
#[derive(Error, PartialEq, Eq)]
pub enum PushError<T> {
    #[error("producer channel is full")]
    Full(T),
    #[error("no producer at this index")]
    UnknownProducer(T),
    #[error("producer has been removed")]
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::UnknownProducer(item) | PushError::Closed(item) => {
                item
            }
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::UnknownProducer(_) => f.write_str("UnknownProducer(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// A drain cycle that could not place everything in the consumer channel
///
/// Only produced under [`ConsumerFullPolicy::Fail`]. `undelivered` keeps the
/// cycle's order and comes after everything already in the consumer channel.
#[derive(Error)]
pub enum DrainError<T> {
    #[error("consumer channel full: {delivered} forwarded, {} undelivered", .undelivered.len())]
    ConsumerFull { delivered: usize, undelivered: Vec<T> },
}

impl<T> fmt::Debug for DrainError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainError::ConsumerFull {
                delivered,
                undelivered,
            } => f
                .debug_struct("ConsumerFull")
                .field("delivered", delivered)
                .field("undelivered", &undelivered.len())
                .finish(),
        }
    }
}

/// One producer's channel plus its retirement flag
struct ProducerChannel<T> {
    channel: RingChannel<T>,
    retired: AtomicBool,
}

/// Multi-producer single-consumer aggregator
///
/// Producer slots live in an append-only arena: an index handed out by
/// [`create_producer`](Self::create_producer) stays valid, and its channel
/// never moves, until the aggregator is dropped. `add` therefore touches no
/// lock at all, which is also why it is `unsafe`: nothing stops two threads
/// from pushing to the same index, so the caller has to.
pub struct Aggregator<T> {
    slots: Box<[OnceLock<ProducerChannel<T>>]>,
    /// Number of initialized slots; slots `0..created` are always set
    created: AtomicUsize,
    create_lock: Mutex<()>,
    /// Serializes drain cycles; never taken by producers
    drain_lock: Mutex<()>,
    /// Serializes consumer-side reads
    pull_lock: Mutex<()>,
    consumer: RingChannel<T>,
    sorter: Option<Sorter<T>>,
    config: AggregatorConfig,
    cycles: AtomicU64,
}

impl<T: Send> Aggregator<T> {
    /// Create an aggregator that forwards items in gather order
    ///
    /// # Panics
    /// Panics if any capacity in `config` is zero
    pub fn new(config: AggregatorConfig) -> Self {
        assert!(config.max_producers > 0, "max_producers must be non-zero");
        assert!(
            config.producer_capacity > 0,
            "producer_capacity must be non-zero"
        );

        let slots: Vec<OnceLock<ProducerChannel<T>>> =
            (0..config.max_producers).map(|_| OnceLock::new()).collect();

        Self {
            slots: slots.into_boxed_slice(),
            created: AtomicUsize::new(0),
            create_lock: Mutex::new(()),
            drain_lock: Mutex::new(()),
            pull_lock: Mutex::new(()),
            consumer: RingChannel::new(config.consumer_capacity),
            sorter: None,
            config,
            cycles: AtomicU64::new(0),
        }
    }

    /// Stable-sort every drain batch with `compare`
    pub fn sorted_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
    {
        self.sorter = Some(Box::new(compare));
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn is_sorted(&self) -> bool {
        self.sorter.is_some()
    }

    /// Allocate a new producer channel and return its index
    pub fn create_producer(&self) -> Result<usize, AggregatorError> {
        let _guard = self.create_lock.lock();

        let index = self.created.load(Ordering::Relaxed);
        if index >= self.slots.len() {
            return Err(AggregatorError::ProducerLimit {
                limit: self.slots.len(),
            });
        }

        let _ = self.slots[index].set(ProducerChannel {
            channel: RingChannel::new(self.config.producer_capacity),
            retired: AtomicBool::new(false),
        });
        // Publish only after the slot is initialized
        self.created.store(index + 1, Ordering::Release);
        Ok(index)
    }

    /// Drain everything, then retire the producer at `index`
    ///
    /// Items already in the channel are forwarded to the consumer before the
    /// slot is closed. Items that race in afterwards are still picked up by
    /// later drain cycles. Under [`ConsumerFullPolicy::Fail`] the items that
    /// did not fit are returned in the error.
    pub fn remove_producer(&self, index: usize) -> Result<(), RemoveError<T>> {
        let producer = self
            .producer(index)
            .ok_or(RemoveError::Unknown(AggregatorError::UnknownProducer { index }))?;

        producer.retired.store(true, Ordering::Release);
        self.drain_cycle().map(|_| ()).map_err(RemoveError::Drain)
    }

    /// Push into the producer channel at `index` (lock-free, never blocks)
    ///
    /// # Safety
    /// No other thread may call `add` with the same `index` while this call
    /// runs. Each index belongs to one writer at a time; contexts that share
    /// an index must serialize their calls.
    #[inline]
    pub unsafe fn add(&self, item: T, index: usize) -> Result<(), PushError<T>> {
        let Some(producer) = self.producer(index) else {
            return Err(PushError::UnknownProducer(item));
        };
        if producer.retired.load(Ordering::Acquire) {
            return Err(PushError::Closed(item));
        }
        // SAFETY: the caller is the only writer for `index`; the drain lock
        // makes the drain cycle the only reader
        unsafe { producer.channel.try_push_shared(item) }.map_err(PushError::Full)
    }

    /// Gather, optionally sort, and forward every available item
    ///
    /// Returns the number of items forwarded into the consumer channel.
    /// Cycles are serialized, so everything from one cycle is enqueued
    /// before anything from the next.
    pub fn drain_cycle(&self) -> Result<usize, DrainError<T>> {
        let _guard = self.drain_lock.lock();

        let mut batch = self.gather_from_all_producers();
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if batch.is_empty() {
            return Ok(0);
        }

        if let Some(compare) = &self.sorter {
            // slice::sort_by is stable: ties keep producer-index then FIFO order
            batch.sort_by(|a, b| compare(a, b));
        }

        self.forward(batch)
    }

    /// Consumer-side read
    #[inline]
    pub fn pull(&self) -> Option<T> {
        let _guard = self.pull_lock.lock();
        // SAFETY: the pull lock makes this the only reader of the consumer
        unsafe { self.consumer.try_pull_shared() }
    }

    /// Number of producer slots created so far (including retired ones)
    pub fn producer_count(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Items waiting in the producer channel at `index`
    pub fn producer_backlog(&self, index: usize) -> Option<usize> {
        self.producer(index).map(|p| p.channel.available_for_read())
    }

    pub fn producer_capacity(&self) -> usize {
        self.config.producer_capacity
    }

    /// Items waiting in the consumer channel
    pub fn consumer_backlog(&self) -> usize {
        self.consumer.available_for_read()
    }

    pub fn consumer_free_space(&self) -> usize {
        self.consumer.free_space()
    }

    /// Drain cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Pushes rejected by producer channels since construction
    pub fn rejected(&self) -> u64 {
        (0..self.producer_count())
            .filter_map(|index| self.producer(index))
            .map(|p| p.channel.rejected())
            .sum()
    }

    #[inline]
    fn producer(&self, index: usize) -> Option<&ProducerChannel<T>> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    fn gather_from_all_producers(&self) -> Vec<T> {
        let count = self.producer_count();
        let backlog: usize = (0..count)
            .filter_map(|index| self.producer_backlog(index))
            .sum();

        let mut batch = Vec::with_capacity(backlog);
        for index in 0..count {
            if let Some(producer) = self.producer(index) {
                // SAFETY: called only under the drain lock, the sole reader
                // of every producer channel
                while let Some(item) = unsafe { producer.channel.try_pull_shared() } {
                    batch.push(item);
                }
            }
        }
        batch
    }

    fn forward(&self, batch: Vec<T>) -> Result<usize, DrainError<T>> {
        let total = batch.len();
        let mut items = batch.into_iter();

        while let Some(item) = items.next() {
            match self.config.consumer_full {
                ConsumerFullPolicy::Block => self.push_blocking(item),
                ConsumerFullPolicy::Fail => {
                    // SAFETY: forward runs under the drain lock, the sole
                    // writer of the consumer channel
                    if let Err(item) = unsafe { self.consumer.try_push_shared(item) } {
                        let mut undelivered = Vec::with_capacity(items.len() + 1);
                        undelivered.push(item);
                        undelivered.extend(items);
                        return Err(DrainError::ConsumerFull {
                            delivered: total - undelivered.len(),
                            undelivered,
                        });
                    }
                }
            }
        }

        Ok(total)
    }

    /// Retry until the consumer channel takes `item`
    ///
    /// If this spins for long the consumer side is not keeping up.
    fn push_blocking(&self, mut item: T) {
        let backoff = Backoff::new();
        // SAFETY: only called from forward, under the drain lock
        while let Err(returned) = unsafe { self.consumer.try_push_shared(item) } {
            item = returned;
            backoff.snooze();
        }
    }
}

impl<T: Timestamped + Send> Aggregator<T> {
    /// Stable-sort every drain batch by creation time
    pub fn sorted_by_timestamp(self) -> Self {
        self.sorted_by(|a, b| a.timestamp().total_cmp(&b.timestamp()))
    }
}

/// Failure of [`Aggregator::remove_producer`]
#[derive(Error)]
pub enum RemoveError<T> {
    #[error(transparent)]
    Unknown(AggregatorError),
    #[error(transparent)]
    Drain(DrainError<T>),
}

impl<T> fmt::Debug for RemoveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveError::Unknown(err) => f.debug_tuple("Unknown").field(err).finish(),
            RemoveError::Drain(err) => f.debug_tuple("Drain").field(err).finish(),
        }
    }
}

impl<T> fmt::Debug for Aggregator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("producers", &self.created.load(Ordering::Relaxed))
            .field("consumer", &self.consumer)
            .field("sorted", &self.sorter.is_some())
            .field("config", &self.config)
            .finish()
    }
}
