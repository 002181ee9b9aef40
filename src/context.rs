//! Trace context: registry + ring buffer as one explicit object
//!
//! The original design kept the buffer and descriptor table in a global
//! singleton; here both live in a `TraceContext` passed by reference (or
//! `Arc`) to producers and the consumer, so independent instances can
//! coexist and tests need no global state.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TraceError};
use crate::payload::EventPayload;
use crate::registry::Registry;
use crate::ring::{Drainer, RingBuffer, RingStats};

thread_local! {
    // Per-thread encode staging, so emit never allocates on a warm path.
    static ENCODE_SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Outcome of an [`TraceContext::emit`] call.
///
/// Dropping under pressure is by design, so neither `Disabled` nor
/// `Dropped` is an error: producers continue unimpeded either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStatus {
    /// The record was committed to the ring.
    Committed,
    /// The tracepoint is disabled; nothing was touched, no lock was taken.
    Disabled,
    /// The ring was full; the event was dropped and counted.
    Dropped,
}

/// Shared tracing instance: one registry, one ring, many producers, at most
/// one attached consumer.
#[derive(Debug)]
pub struct TraceContext {
    registry: Registry,
    ring: RingBuffer,
    consumer_attached: AtomicBool,
}

impl TraceContext {
    /// Build a context over a fresh ring of `capacity` bytes.
    pub fn new(registry: Registry, capacity: usize) -> Result<Self> {
        Ok(Self {
            registry,
            ring: RingBuffer::with_capacity(capacity)?,
            consumer_attached: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Record one event.
    ///
    /// Disabled tracepoints cost one atomic load and return immediately.
    /// Otherwise: reserve (producers serialize here), encode into the
    /// claimed slot, commit. A full ring drops the event silently —
    /// producers never block or retry.
    ///
    /// Errs only on an unregistered id.
    pub fn emit<P: EventPayload>(&self, id: u8, payload: &P) -> Result<EmitStatus> {
        let descriptor = self.registry.get(id)?;
        if !descriptor.is_enabled() {
            return Ok(EmitStatus::Disabled);
        }
        debug_assert_eq!(
            descriptor.payload_size(),
            P::SIZE,
            "payload type does not match tracepoint '{}'",
            descriptor.name()
        );

        let mut reservation = match self.ring.reserve(id, P::SIZE) {
            Ok(reservation) => reservation,
            Err(TraceError::NoSpace { .. }) => return Ok(EmitStatus::Dropped),
            Err(e) => return Err(e),
        };

        ENCODE_SCRATCH.with(|cell| {
            let mut scratch = cell.borrow_mut();
            scratch.clear();
            scratch.resize(P::SIZE, 0);
            let written = payload.encode(&mut scratch);
            debug_assert_eq!(written, P::SIZE, "encode length contract violated");
            reservation.write_payload(&scratch);
        });
        reservation.commit();

        Ok(EmitStatus::Committed)
    }

    pub fn enable(&self, id: u8) -> Result<()> {
        self.registry.enable(id)
    }

    pub fn disable(&self, id: u8) -> Result<()> {
        self.registry.disable(id)
    }

    pub fn is_enabled(&self, id: u8) -> bool {
        self.registry.is_enabled(id)
    }

    pub fn stats(&self) -> RingStats {
        self.ring.stats()
    }

    /// Claim the single consumer slot.
    ///
    /// Only one drain task may run per ring: `tail` has no lock. A second
    /// call fails with `ConsumerAlreadyAttached` until the first `Drainer`
    /// is dropped.
    pub fn drainer(self: &Arc<Self>) -> Result<Drainer> {
        if self
            .consumer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TraceError::ConsumerAlreadyAttached);
        }
        Ok(Drainer::new(self.clone()))
    }

    pub(crate) fn release_consumer(&self) {
        self.consumer_attached.store(false, Ordering::Release);
    }
}
