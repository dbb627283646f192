// SPDX-License-Identifier: Apache-2.0 OR MIT
// Bounded single-producer single-consumer ring channel
//
// Same sequence-cursor layout as a printk-style ring, but a full channel
// rejects the push instead of overwriting the oldest slot.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of slots in a producer channel.
pub const DEFAULT_PRODUCER_CAPACITY: usize = 1_000;

/// Consumer channel size relative to the producer channel size.
pub const DEFAULT_CONSUMER_FACTOR: usize = 8;

/// Cache-aligned wrapper to prevent false sharing
#[repr(align(64))]
struct CacheAligned<T>(T);

/// Lock-free bounded single-producer single-consumer channel
///
/// With exclusive access, [`try_push`](Self::try_push) and
/// [`try_pull`](Self::try_pull) are always safe. Splitting the two ends across
/// threads goes through the `unsafe` shared variants, whose callers promise
/// one writer and one reader at a time.
///
/// `write_seq` and `read_seq` only ever grow. The slot for a cursor is
/// `cursor % capacity`, and `write_seq - read_seq` never exceeds `capacity`.
pub struct RingChannel<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    write_seq: CacheAligned<AtomicU64>,
    read_seq: CacheAligned<AtomicU64>,
    rejected: AtomicU64,
}

// SAFETY: RingChannel is Sync because:
// - Safe pushes and pulls need `&mut self`
// - Shared pushes and pulls are `unsafe`, and their callers uphold one
//   writer and one reader at a time
// - A slot is written only while it is outside [read_seq, write_seq) and read
//   only while inside it; the Release/Acquire pair on the cursors publishes it
unsafe impl<T: Send> Sync for RingChannel<T> {}
unsafe impl<T: Send> Send for RingChannel<T> {}

impl<T> RingChannel<T> {
    /// Create a channel holding at most `capacity` items
    ///
    /// # Panics
    /// Panics if capacity is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        let slots: Vec<UnsafeCell<MaybeUninit<T>>> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            capacity,
            write_seq: CacheAligned(AtomicU64::new(0)),
            read_seq: CacheAligned(AtomicU64::new(0)),
            rejected: AtomicU64::new(0),
        }
    }

    /// Push an item
    ///
    /// Never blocks and never allocates. When the channel is full the item
    /// is handed back in `Err` and the contents are left untouched.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        // SAFETY: `&mut self` excludes every other writer and reader
        unsafe { self.try_push_shared(item) }
    }

    /// Pull the oldest item, or None if the channel is empty
    pub fn try_pull(&mut self) -> Option<T> {
        // SAFETY: `&mut self` excludes every other writer and reader
        unsafe { self.try_pull_shared() }
    }

    /// Push through a shared reference (lock-free, single producer)
    ///
    /// Same behavior as [`try_push`](Self::try_push).
    ///
    /// # Safety
    /// No other thread may be inside `try_push_shared` on this channel for
    /// the duration of the call. A concurrent [`try_pull_shared`](Self::try_pull_shared)
    /// is fine.
    pub unsafe fn try_push_shared(&self, item: T) -> Result<(), T> {
        let seq = self.write_seq.0.load(Ordering::Relaxed);
        let read_seq = self.read_seq.0.load(Ordering::Acquire);

        if seq - read_seq >= self.capacity as u64 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(item);
        }

        let pos = (seq % self.capacity as u64) as usize;
        // SAFETY: the slot is free (outside the readable window) and the
        // caller guarantees we are the only writer at `write_seq`.
        unsafe {
            (*self.slots[pos].get()).write(item);
        }

        // Publish the slot to the reader
        self.write_seq.0.store(seq + 1, Ordering::Release);
        Ok(())
    }

    /// Pull through a shared reference (lock-free, single consumer)
    ///
    /// # Safety
    /// No other thread may be inside `try_pull_shared` on this channel for
    /// the duration of the call. A concurrent [`try_push_shared`](Self::try_push_shared)
    /// is fine.
    pub unsafe fn try_pull_shared(&self) -> Option<T> {
        let seq = self.read_seq.0.load(Ordering::Relaxed);
        let write_seq = self.write_seq.0.load(Ordering::Acquire);

        if seq >= write_seq {
            return None;
        }

        let pos = (seq % self.capacity as u64) as usize;
        // SAFETY: the slot is inside the readable window, so the producer has
        // initialized it and will not touch it until read_seq moves past it.
        let item = unsafe { (*self.slots[pos].get()).assume_init_read() };

        // Hand the slot back to the writer
        self.read_seq.0.store(seq + 1, Ordering::Release);
        Some(item)
    }

    /// Number of items waiting to be pulled
    pub fn available_for_read(&self) -> usize {
        let write_seq = self.write_seq.0.load(Ordering::Acquire);
        let read_seq = self.read_seq.0.load(Ordering::Acquire);
        (write_seq.saturating_sub(read_seq) as usize).min(self.capacity)
    }

    /// Number of pushes that would currently succeed
    pub fn free_space(&self) -> usize {
        self.capacity - self.available_for_read()
    }

    /// Fixed capacity given at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes rejected because the channel was full
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.available_for_read() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }
}

impl<T> Drop for RingChannel<T> {
    fn drop(&mut self) {
        // Drop whatever was never pulled
        while self.try_pull().is_some() {}
    }
}

impl<T> fmt::Debug for RingChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingChannel")
            .field("capacity", &self.capacity)
            .field("available", &self.available_for_read())
            .field("rejected", &self.rejected())
            .finish()
    }
}
