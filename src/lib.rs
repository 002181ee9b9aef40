//! # ringtrace — lightweight multi-producer event tracing
//!
//! Multiple producer threads record fixed-schema events into a shared,
//! fixed-capacity circular byte log; one consumer thread drains, decodes,
//! and reports them.
//!
//! ## Core Principle
//!
//! > Producers never block on a full buffer. Under pressure the design
//! > drops events, and the drop is counted.
//!
//! ## Architecture
//!
//! ```text
//! emit(id, payload)              RingBuffer                 Drainer
//! ─────────────────       ──────────────────────       ───────────────
//! enabled? ──no──► return  tag │ payload │ tag │ …  ──► skip dummies
//!     │ yes                ▲ head (producers,           decode via
//! reserve ► encode ► commit│  one mutex)                registry lookup
//!                          ▼ tail (single consumer,     advance tail
//!                             lock-free)
//! ```
//!
//! - [`Registry`]: immutable table of [`TracepointDescriptor`]s, id =
//!   registration index, per-descriptor enable flags toggleable at runtime.
//! - [`RingBuffer`]: power-of-two byte ring; records are `tag(1) + payload(n)`
//!   and never wrap — unusable space before the physical end is padded with
//!   dummy records.
//! - [`TraceContext`]: owns both; producers call [`TraceContext::emit`],
//!   the consumer runs a [`Drainer`] (at most one per context).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use ringtrace::{Registry, TracepointDescriptor, TraceContext, EmitStatus};
//!
//! let total = Arc::new(AtomicU64::new(0));
//! let sink = total.clone();
//!
//! let registry = Registry::new(vec![
//!     TracepointDescriptor::new::<u64, _>("request.handled", move |micros| {
//!         sink.fetch_add(micros, Ordering::Relaxed);
//!     }),
//! ]).unwrap();
//!
//! let ctx = Arc::new(TraceContext::new(registry, 1024).unwrap());
//!
//! assert_eq!(ctx.emit(0, &125u64).unwrap(), EmitStatus::Committed);
//!
//! let mut drainer = ctx.drainer().unwrap();
//! drainer.drain_available().unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 125);
//! ```
//!
//! For a long-running consumer, [`spawn_drain`] runs the loop in a
//! background thread with an explicit shutdown handle.
//!
//! ## What this is not
//!
//! No durability beyond the buffer's lifetime, no delivery guarantee, and
//! no cross-machine serialization: payloads such as `usize` may embed
//! values meaningful only inside the writing process.

pub mod context;
pub mod error;
pub mod payload;
pub mod registry;
pub mod ring;

pub use context::{EmitStatus, TraceContext};
pub use error::{Result, TraceError};
pub use payload::EventPayload;
pub use registry::{Registry, TracepointDescriptor, DUMMY_TAG, MAX_TRACEPOINTS};
pub use ring::{
    spawn_drain, DrainConfig, DrainHandle, Drainer, Reservation, RingBuffer, RingStats,
    MIN_CAPACITY,
};

/// Crate version, for demo/diagnostic output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
