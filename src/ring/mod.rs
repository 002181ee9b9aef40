//! Ring buffer core, reservation protocol, and drain loop
//!
//! ```text
//! Producer path (serialized on one mutex)    Consumer path (lock-free)
//! ───────────────────────────────────────    ─────────────────────────
//! reserve(tag, len) ─► write_payload ─► commit ─► ... ─► take_tag
//!        │                                  │            take_payload
//!        └─ NoSpace: drop the event         └─ notify    decode callback
//! ```
//!
//! The producer critical section spans exactly one reserve + payload copy +
//! commit. The consumer owns `tail` and suspends only on "no data yet".

mod buffer;
mod drain;

pub use buffer::{Reservation, RingBuffer, RingStats, MIN_CAPACITY};
pub use drain::{spawn_drain, DrainConfig, DrainHandle, Drainer};
