//! Ring buffer core and reservation protocol
//!
//! A fixed-capacity circular byte log shared by all producers and the one
//! consumer. Records are `tag(1) + payload(n)` packed contiguously; a record
//! never wraps, so when it would not fit before the physical end the
//! remaining bytes are filled with dummy tags and `head` wraps to 0.
//!
//! # Cursor discipline
//!
//! - `head` is mutated only while holding the writer mutex.
//! - `tail` is mutated only by the single consumer, lock-free.
//! - One byte is always kept unused so `head == tail` means exactly "empty":
//!   `used = (head - tail) & (capacity - 1)`, `free = capacity - used - 1`.
//!
//! Payload bytes are relaxed atomic stores/loads; the release store of `head`
//! in [`Reservation::commit`] publishes them to the consumer, and the release
//! store of `tail` hands freed space back to producers.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::error::{Result, TraceError};
use crate::registry::DUMMY_TAG;

/// Smallest valid capacity: one slack byte plus a zero-payload record.
pub const MIN_CAPACITY: usize = 2;

/// Fixed-capacity circular byte log with head/tail cursors.
pub struct RingBuffer {
    data: Box<[AtomicU8]>,
    capacity: usize,
    mask: usize,

    /// Write cursor. Guarded by `writer`; release-stored on commit.
    head: AtomicUsize,
    /// Read cursor. Owned by the single consumer.
    tail: AtomicUsize,

    /// Serializes all producers for the span reserve -> copy -> commit.
    writer: Mutex<()>,

    /// Consumer wakeup, nudged by `commit`. Paired with its own mutex so
    /// the consumer never touches the producer lock.
    wakeup_lock: Mutex<()>,
    wakeup: Condvar,

    committed: AtomicU64,
    dropped: AtomicU64,
    drained: AtomicU64,
    padding_bytes: AtomicU64,
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}

impl RingBuffer {
    /// Create a zeroed ring of `capacity` bytes with `head = tail = 0`.
    ///
    /// The capacity must be a power of two (cursor arithmetic is masked) and
    /// at least [`MIN_CAPACITY`]; anything else fails with `InvalidCapacity`
    /// and leaves nothing running.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() || capacity < MIN_CAPACITY {
            return Err(TraceError::InvalidCapacity {
                capacity,
                minimum: MIN_CAPACITY,
            });
        }

        let data: Box<[AtomicU8]> = (0..capacity).map(|_| AtomicU8::new(0)).collect();

        Ok(Self {
            data,
            capacity,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            writer: Mutex::new(()),
            wakeup_lock: Mutex::new(()),
            wakeup: Condvar::new(),
            committed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            padding_bytes: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently committed and not yet drained.
    pub fn used(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & self.mask
    }

    /// Bytes available for new records. One byte stays unused so that a
    /// full ring is distinguishable from an empty one.
    pub fn free_space(&self) -> usize {
        self.capacity - self.used() - 1
    }

    /// Bytes writable from `head` to the physical end without wrapping,
    /// bounded by `free_space`.
    pub fn contiguous_to_end(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        self.free_space().min(self.capacity - head)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Relaxed)
    }

    /// Claim space for one record.
    ///
    /// Acquires the writer mutex and keeps it held through the returned
    /// [`Reservation`] — the critical section deliberately spans "claim slot,
    /// copy payload, commit" so contention is bounded by one payload copy.
    /// When the record fits overall but not contiguously before the physical
    /// end, the remainder is padded with dummy tags first and the check is
    /// rerun. Fails with `NoSpace` (and counts a drop) when the record does
    /// not fit at all; the buffer may still have absorbed padding in that
    /// case, exactly as the space was unusable for this record anyway.
    pub fn reserve(&self, tag: u8, payload_len: usize) -> Result<Reservation<'_>> {
        debug_assert_ne!(tag, DUMMY_TAG, "dummy tag is reserved for padding");
        let required = 1 + payload_len;

        let guard = self.writer.lock();
        loop {
            let free = self.free_space();
            if free < required {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(TraceError::NoSpace { required, free });
            }
            if self.contiguous_to_end() >= required {
                break;
            }
            self.pad_to_end(&guard);
        }

        // The tag is written before the payload; safe, because the consumer
        // cannot observe it until commit advances head.
        let head = self.head.load(Ordering::Relaxed);
        self.data[head].store(tag, Ordering::Relaxed);

        Ok(Reservation {
            ring: self,
            _guard: guard,
            payload_at: head + 1,
            payload_len,
        })
    }

    /// Fill every byte from `head` to the physical end with the dummy tag
    /// and wrap `head` to 0. Only called when the pending record fits in
    /// total but not contiguously, so the padded span is known free.
    fn pad_to_end(&self, _writer_guard: &MutexGuard<'_, ()>) {
        let head = self.head.load(Ordering::Relaxed);
        let len = self.capacity - head;
        debug_assert!(len <= self.free_space());

        for slot in &self.data[head..] {
            slot.store(DUMMY_TAG, Ordering::Relaxed);
        }
        self.head.store(0, Ordering::Release);
        self.padding_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Block until the ring is non-empty or the timeout elapses.
    ///
    /// Commit notifies without holding the wakeup mutex, so a notification
    /// can slip by; the timeout bounds the resulting delay. Returns whether
    /// data is available.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        if !self.is_empty() {
            return true;
        }
        let mut guard = self.wakeup_lock.lock();
        if !self.is_empty() {
            return true;
        }
        self.wakeup.wait_for(&mut guard, timeout);
        !self.is_empty()
    }

    /// Pop the tag byte at `tail`, advancing by one. Single consumer only.
    pub(crate) fn take_tag(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            return None;
        }
        let tag = self.data[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) & self.mask, Ordering::Release);
        Some(tag)
    }

    /// Copy the `len` payload bytes at `tail` into `scratch` and advance.
    /// Payloads never wrap, so the copy is contiguous. Single consumer only.
    pub(crate) fn take_payload(&self, len: usize, scratch: &mut Vec<u8>) {
        let tail = self.tail.load(Ordering::Relaxed);
        debug_assert!(tail + len <= self.capacity, "payload crosses physical end");

        scratch.clear();
        scratch.extend(
            self.data[tail..tail + len]
                .iter()
                .map(|slot| slot.load(Ordering::Relaxed)),
        );
        self.tail.store((tail + len) & self.mask, Ordering::Release);
    }

    pub(crate) fn note_drained(&self) {
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the ring's counters and occupancy.
    pub fn stats(&self) -> RingStats {
        let used = self.used();
        RingStats {
            capacity: self.capacity,
            used,
            free: self.capacity - used - 1,
            committed: self.committed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            padding_bytes: self.padding_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A claimed slot in the ring, holding the writer lock until committed.
///
/// Produced by [`RingBuffer::reserve`]. Copy the payload in with
/// [`write_payload`](Self::write_payload), then [`commit`](Self::commit).
/// Dropping without committing abandons the record: `head` never advances,
/// so the consumer cannot observe the written tag byte.
#[must_use = "a reservation holds the writer lock until committed or dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    ring: &'a RingBuffer,
    _guard: MutexGuard<'a, ()>,
    payload_at: usize,
    payload_len: usize,
}

impl Reservation<'_> {
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Copy the encoded payload into the claimed slot. `bytes` must be
    /// exactly the reserved length.
    pub fn write_payload(&mut self, bytes: &[u8]) {
        assert_eq!(bytes.len(), self.payload_len, "payload length mismatch");
        for (slot, &byte) in self.ring.data[self.payload_at..self.payload_at + bytes.len()]
            .iter()
            .zip(bytes)
        {
            slot.store(byte, Ordering::Relaxed);
        }
    }

    /// Publish the record: advance `head` past tag and payload, nudge the
    /// consumer, release the writer lock.
    pub fn commit(self) {
        let ring = self.ring;
        let next = (self.payload_at + self.payload_len) & ring.mask;
        ring.head.store(next, Ordering::Release);
        ring.committed.fetch_add(1, Ordering::Relaxed);
        ring.wakeup.notify_one();
        // writer lock released as the guard drops
    }
}

/// Counters and occupancy snapshot for one ring buffer.
#[derive(Debug, Clone, Serialize)]
pub struct RingStats {
    pub capacity: usize,
    pub used: usize,
    pub free: usize,
    /// Records committed by producers.
    pub committed: u64,
    /// Records dropped because the ring was full.
    pub dropped: u64,
    /// Records decoded by the consumer (dummy bytes not included).
    pub drained: u64,
    /// Dummy bytes written to skip unusable space before wraparound.
    pub padding_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(ring: &RingBuffer) -> usize {
        ring.head.load(Ordering::Relaxed)
    }

    fn tail_of(ring: &RingBuffer) -> usize {
        ring.tail.load(Ordering::Relaxed)
    }

    #[test]
    fn test_capacity_validation() {
        for capacity in [2usize, 4, 8, 16, 1024, 65536] {
            assert!(RingBuffer::with_capacity(capacity).is_ok(), "{capacity}");
        }
        for capacity in [0usize, 1, 3, 5, 6, 7, 12, 100, 2047] {
            let err = RingBuffer::with_capacity(capacity).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CAPACITY", "{capacity}");
        }
    }

    #[test]
    fn test_fresh_ring_is_zeroed_and_empty() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.free_space(), 15);
        assert_eq!(ring.contiguous_to_end(), 15);
        assert!(ring.data.iter().all(|b| b.load(Ordering::Relaxed) == 0));
    }

    #[test]
    fn test_reserve_commit_advances_head() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        let mut reservation = ring.reserve(3, 4).unwrap();
        reservation.write_payload(&[1, 2, 3, 4]);
        reservation.commit();

        assert_eq!(head_of(&ring), 5);
        assert_eq!(ring.used(), 5);
        assert_eq!(ring.data[0].load(Ordering::Relaxed), 3);
        assert_eq!(ring.data[2].load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_dropped_reservation_leaves_no_trace_visible() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        {
            let reservation = ring.reserve(0, 4).unwrap();
            assert_eq!(reservation.payload_len(), 4);
            // dropped uncommitted
        }
        assert!(ring.is_empty());
        assert_eq!(ring.stats().committed, 0);

        // The lock was released, so a later reserve succeeds.
        ring.reserve(0, 4).unwrap().commit();
        assert_eq!(ring.used(), 5);
    }

    #[test]
    fn test_no_space_is_deterministic_and_nondestructive() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        // used = 5, free = 2
        ring.reserve(0, 4).unwrap().commit();

        let before_head = head_of(&ring);
        let err = ring.reserve(0, 2).unwrap_err();
        match err {
            TraceError::NoSpace { required, free } => {
                assert_eq!(required, 3);
                assert_eq!(free, 2);
            }
            other => panic!("expected NoSpace, got {other:?}"),
        }
        // Failed reserve on the no-padding path changes nothing but the
        // drop counter.
        assert_eq!(head_of(&ring), before_head);
        assert_eq!(ring.used(), 5);
        assert_eq!(ring.stats().dropped, 1);

        // A record that just fits still goes through: free == 2 == 1 + 1.
        ring.reserve(0, 1).unwrap().commit();
        assert_eq!(ring.free_space(), 0);
    }

    #[test]
    fn test_exact_fit_to_end_wraps_without_padding() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        ring.reserve(0, 3).unwrap().commit();
        assert_eq!(head_of(&ring), 4);

        // Free the first record so the next one has room.
        ring.take_tag().unwrap();
        let mut scratch = Vec::new();
        ring.take_payload(3, &mut scratch);
        assert_eq!(tail_of(&ring), 4);

        // Second record occupies bytes 4..8 exactly; head wraps to 0.
        ring.reserve(0, 3).unwrap().commit();
        assert_eq!(head_of(&ring), 0);
        assert_eq!(ring.stats().padding_bytes, 0);
    }

    #[test]
    fn test_padding_fills_remainder_with_dummy_and_wraps() {
        let ring = RingBuffer::with_capacity(8).unwrap();

        // head = 6, tail = 6: plenty free but only 2 contiguous bytes left.
        ring.reserve(0, 3).unwrap().commit();
        ring.take_tag().unwrap();
        let mut scratch = Vec::new();
        ring.take_payload(3, &mut scratch);
        ring.reserve(1, 1).unwrap().commit();
        ring.take_tag().unwrap();
        ring.take_payload(1, &mut scratch);
        assert_eq!(head_of(&ring), 6);

        // A 4-byte record cannot fit in bytes 6..8, so both become dummies
        // and the record lands at 0..4.
        ring.reserve(0, 3).unwrap().commit();
        assert_eq!(ring.data[6].load(Ordering::Relaxed), DUMMY_TAG);
        assert_eq!(ring.data[7].load(Ordering::Relaxed), DUMMY_TAG);
        assert_eq!(head_of(&ring), 4);
        assert_eq!(ring.stats().padding_bytes, 2);

        // The consumer sees each dummy byte as its own empty record.
        assert_eq!(ring.take_tag(), Some(DUMMY_TAG));
        assert_eq!(ring.take_tag(), Some(DUMMY_TAG));
        assert_eq!(ring.take_tag(), Some(0));
    }

    #[test]
    fn test_space_invariant_under_random_operations() {
        // Deterministic xorshift so failures reproduce.
        let mut state = 0x9E37_79B9_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let ring = RingBuffer::with_capacity(64).unwrap();
        let mut scratch = Vec::new();
        let mut pending: std::collections::VecDeque<usize> = Default::default();

        for _ in 0..10_000 {
            if next() % 2 == 0 {
                let payload_len = (next() % 9) as usize;
                if let Ok(mut reservation) = ring.reserve(0, payload_len) {
                    reservation.write_payload(&vec![0xAB; payload_len]);
                    reservation.commit();
                    pending.push_back(payload_len);
                }
            } else if !ring.is_empty() {
                match ring.take_tag().unwrap() {
                    DUMMY_TAG => {}
                    _ => {
                        let payload_len = pending.pop_front().unwrap();
                        ring.take_payload(payload_len, &mut scratch);
                        assert!(scratch.iter().all(|&b| b == 0xAB));
                    }
                }
            }
            assert_eq!(ring.free_space() + ring.used(), ring.capacity() - 1);
        }
    }

    #[test]
    fn test_contiguous_to_end_is_bounded_by_free_space() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        ring.reserve(0, 5).unwrap().commit(); // head = 6, tail = 0
        assert_eq!(ring.free_space(), 1);
        // Two bytes to the physical end, but only one is actually free.
        assert_eq!(ring.contiguous_to_end(), 1);
    }

    #[test]
    fn test_wait_for_data_sees_committed_record() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        assert!(!ring.wait_for_data(Duration::from_millis(1)));
        ring.reserve(0, 0).unwrap().commit();
        assert!(ring.wait_for_data(Duration::from_millis(1)));
    }

    #[test]
    fn test_stats_counters() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        ring.reserve(0, 4).unwrap().commit();
        assert!(ring.reserve(0, 4).is_err());

        let stats = ring.stats();
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.used, 5);
        assert_eq!(stats.free, 2);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["dropped"], 1);
    }
}
