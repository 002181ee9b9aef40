//! Tracepoint registry
//!
//! An immutable, ordered table of tracepoint descriptors. Ids are assigned
//! sequentially at registration, so a tag byte in the ring maps straight to a
//! table index. The only mutable state is each descriptor's enable flag: a
//! single relaxed atomic that any thread may toggle at will. A torn read of
//! the flag costs at most one traced or skipped event, which is accepted.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, TraceError};
use crate::payload::EventPayload;

/// Tag reserved for padding records. A dummy record is a single tag byte
/// with no payload, written to skip unusable space before wraparound.
/// Never assigned to a real tracepoint.
pub const DUMMY_TAG: u8 = 0xff;

/// Maximum number of registrable tracepoints. Tags are one byte and the
/// dummy tag is reserved, which caps the id space.
pub const MAX_TRACEPOINTS: usize = 254;

/// Decode callback: given the payload bytes of one record, report the event
/// and return the number of bytes consumed.
///
/// The returned count must equal the descriptor's `payload_size`; the drain
/// loop advances its cursor by that amount.
pub type DecodeFn = Box<dyn Fn(&[u8]) -> usize + Send + Sync>;

/// A named, individually enable/disable-able event type with a fixed
/// payload layout and, once registered, an assigned numeric id.
pub struct TracepointDescriptor {
    id: u8,
    name: String,
    enabled: AtomicBool,
    payload_size: usize,
    decode: DecodeFn,
}

impl std::fmt::Debug for TracepointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracepointDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("payload_size", &self.payload_size)
            .field("decode", &"<callback>")
            .finish()
    }
}

impl TracepointDescriptor {
    /// Create a descriptor for a typed payload.
    ///
    /// The handler receives each decoded value on the consumer thread. The
    /// payload size and decode callback are derived from `P`, so the encode
    /// and decode sides cannot disagree on the layout.
    ///
    /// Descriptors start enabled; use [`disabled`](Self::disabled) or
    /// [`Registry::disable`] to opt out.
    pub fn new<P, F>(name: impl Into<String>, handler: F) -> Self
    where
        P: EventPayload,
        F: Fn(P) + Send + Sync + 'static,
    {
        let decode: DecodeFn = Box::new(move |bytes| {
            let (value, consumed) = P::decode(bytes);
            handler(value);
            consumed
        });
        Self::raw(name, P::SIZE, decode)
    }

    /// Create a descriptor from a payload size and a raw decode callback.
    ///
    /// Escape hatch for layouts not expressible as an `EventPayload` type.
    /// The callback owns the length contract: it must return exactly
    /// `payload_size`.
    pub fn raw(name: impl Into<String>, payload_size: usize, decode: DecodeFn) -> Self {
        Self {
            id: 0, // assigned by Registry::new
            name: name.into(),
            enabled: AtomicBool::new(true),
            payload_size,
            decode,
        }
    }

    /// Start with the enable flag cleared.
    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::Relaxed);
        self
    }

    /// The assigned id (the registration index). Zero until registered.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The tracepoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed payload size in bytes for this tracepoint type.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Run the decode callback on one record's payload bytes.
    pub(crate) fn decode(&self, payload: &[u8]) -> usize {
        (self.decode)(payload)
    }
}

/// Immutable ordered table of tracepoint descriptors, `id == index`.
///
/// Built once before any producer runs. Apart from the per-descriptor
/// enable flags nothing changes after construction.
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<TracepointDescriptor>,
}

impl Registry {
    /// Build the registry, assigning `id = index` to each descriptor.
    ///
    /// Fails with `RegistrationOverflow` when more than
    /// [`MAX_TRACEPOINTS`] descriptors are supplied.
    pub fn new(mut descriptors: Vec<TracepointDescriptor>) -> Result<Self> {
        if descriptors.len() > MAX_TRACEPOINTS {
            return Err(TraceError::RegistrationOverflow {
                count: descriptors.len(),
                max: MAX_TRACEPOINTS,
            });
        }
        for (index, descriptor) in descriptors.iter_mut().enumerate() {
            descriptor.id = index as u8;
        }
        log::debug!("tracepoint registry built with {} entries", descriptors.len());
        Ok(Self { descriptors })
    }

    /// Look up a descriptor by id.
    pub fn get(&self, id: u8) -> Result<&TracepointDescriptor> {
        self.descriptors
            .get(id as usize)
            .ok_or(TraceError::OutOfRange { id })
    }

    /// Set the enable flag for `id`. Idempotent.
    pub fn enable(&self, id: u8) -> Result<()> {
        self.get(id)?.enable();
        Ok(())
    }

    /// Clear the enable flag for `id`. Idempotent.
    pub fn disable(&self, id: u8) -> Result<()> {
        self.get(id)?.disable();
        Ok(())
    }

    /// Whether `id` is registered and enabled.
    pub fn is_enabled(&self, id: u8) -> bool {
        self.descriptors
            .get(id as usize)
            .map(TracepointDescriptor::is_enabled)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TracepointDescriptor> {
        self.descriptors.iter()
    }
}
