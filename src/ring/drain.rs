//! Consumer-side drain loop
//!
//! Exactly one [`Drainer`] may exist per [`TraceContext`]; the context
//! enforces the claim. The drainer never takes the producer lock: `tail` is
//! its alone, and its only suspension point is "no data yet", a condvar wait
//! bounded by the configured poll interval.
//!
//! ```text
//! producers ──reserve/commit──► RingBuffer ──drain──► decode callbacks
//!                                  │
//!                                  └─ Drainer::run until shutdown flag
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::context::TraceContext;
use crate::error::Result;
use crate::registry::DUMMY_TAG;

/// Default wait when the ring is empty.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the drain loop
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Upper bound on how long the consumer sleeps when the ring is empty.
    pub poll_interval: Duration,
    /// Whether to drain the residue once after the shutdown flag is seen.
    pub drain_on_shutdown: bool,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_on_shutdown: true,
        }
    }
}

impl DrainConfig {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }
}

/// The single consumer of a trace context.
///
/// Obtained from [`TraceContext::drainer`]; dropping it releases the
/// consumer slot.
#[derive(Debug)]
pub struct Drainer {
    ctx: Arc<TraceContext>,
    scratch: Vec<u8>,
}

impl Drainer {
    pub(crate) fn new(ctx: Arc<TraceContext>) -> Self {
        Self {
            ctx,
            scratch: Vec::new(),
        }
    }

    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    /// Decode everything currently committed. Returns the number of real
    /// records decoded (dummy padding bytes are skipped, one per iteration,
    /// each being its own zero-length record).
    ///
    /// An unregistered tag is fatal: the stream is corrupt or a codec lied
    /// about its length, and no later record boundary can be trusted.
    pub fn drain_available(&mut self) -> Result<usize> {
        let ring = self.ctx.ring();
        let registry = self.ctx.registry();

        let mut decoded = 0;
        while let Some(tag) = ring.take_tag() {
            if tag == DUMMY_TAG {
                continue;
            }
            let descriptor = registry.get(tag)?;
            ring.take_payload(descriptor.payload_size(), &mut self.scratch);
            let consumed = descriptor.decode(&self.scratch);
            debug_assert_eq!(
                consumed,
                descriptor.payload_size(),
                "decode length contract violated by tracepoint '{}'",
                descriptor.name()
            );
            ring.note_drained();
            decoded += 1;
        }
        Ok(decoded)
    }

    /// Run until `shutdown` is set, waiting on the ring's wakeup signal
    /// whenever a pass finds nothing. Checks the flag once per iteration so
    /// termination is deterministic.
    pub fn run(&mut self, shutdown: &AtomicBool, config: &DrainConfig) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            match self.drain_available() {
                Ok(0) => {
                    self.ctx.ring().wait_for_data(config.poll_interval);
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("drain loop stopping: {e} [{}]", e.error_code());
                    return Err(e);
                }
            }
        }

        if config.drain_on_shutdown {
            self.drain_available()?;
        }
        Ok(())
    }
}

impl Drop for Drainer {
    fn drop(&mut self) {
        self.ctx.release_consumer();
    }
}

/// Run the drain loop in a background thread.
///
/// Fails with `ConsumerAlreadyAttached` if the context already has a
/// drainer. The returned handle stops the loop on [`DrainHandle::join`]
/// (or signals it on drop, without blocking).
pub fn spawn_drain(ctx: Arc<TraceContext>, config: DrainConfig) -> Result<DrainHandle> {
    let mut drainer = ctx.drainer()?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let thread_shutdown = shutdown.clone();

    let handle = thread::spawn(move || drainer.run(&thread_shutdown, &config));

    Ok(DrainHandle {
        shutdown,
        handle: Some(handle),
    })
}

/// Handle to a background drain thread.
pub struct DrainHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl DrainHandle {
    /// Signal the loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Signal shutdown and wait for the loop to finish, propagating any
    /// fatal drain error.
    pub fn join(mut self) -> Result<()> {
        self.shutdown();
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }
}

impl Drop for DrainHandle {
    fn drop(&mut self) {
        // Signal but never block in drop.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EmitStatus;
    use crate::registry::{Registry, TracepointDescriptor};
    use parking_lot::Mutex;

    fn context_with_collector(
        capacity: usize,
    ) -> (Arc<TraceContext>, Arc<Mutex<Vec<(u8, u64)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_a = seen.clone();
        let seen_b = seen.clone();
        let registry = Registry::new(vec![
            TracepointDescriptor::new::<u64, _>("a", move |v| seen_a.lock().push((0, v))),
            TracepointDescriptor::new::<u64, _>("b", move |v| seen_b.lock().push((1, v))),
        ])
        .unwrap();
        let ctx = Arc::new(TraceContext::new(registry, capacity).unwrap());
        (ctx, seen)
    }

    #[test]
    fn test_drain_available_decodes_in_order() {
        let (ctx, seen) = context_with_collector(64);
        ctx.emit(0, &10u64).unwrap();
        ctx.emit(1, &20u64).unwrap();
        ctx.emit(0, &30u64).unwrap();

        let mut drainer = ctx.drainer().unwrap();
        assert_eq!(drainer.drain_available().unwrap(), 3);
        assert_eq!(*seen.lock(), vec![(0, 10), (1, 20), (0, 30)]);
        assert!(ctx.ring().is_empty());
    }

    #[test]
    fn test_second_drainer_rejected_until_first_dropped() {
        let (ctx, _) = context_with_collector(64);
        let first = ctx.drainer().unwrap();
        let err = ctx.drainer().unwrap_err();
        assert_eq!(err.error_code(), "CONSUMER_ALREADY_ATTACHED");

        drop(first);
        assert!(ctx.drainer().is_ok());
    }

    #[test]
    fn test_spawned_drain_consumes_and_joins() {
        let (ctx, seen) = context_with_collector(64);
        let config = DrainConfig::default().poll_interval(Duration::from_millis(1));
        let handle = spawn_drain(ctx.clone(), config).unwrap();

        for i in 0..10u64 {
            assert_eq!(ctx.emit(0, &i).unwrap(), EmitStatus::Committed);
        }

        // join signals shutdown; drain_on_shutdown sweeps the residue.
        handle.join().unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 10);
        assert_eq!(ctx.stats().drained, 10);
    }

    #[test]
    fn test_shutdown_without_residue_drain() {
        let (ctx, seen) = context_with_collector(64);
        let handle = spawn_drain(
            ctx.clone(),
            DrainConfig::default()
                .poll_interval(Duration::from_millis(1))
                .drain_on_shutdown(false),
        )
        .unwrap();

        handle.shutdown();
        assert!(!handle.is_running());
        handle.join().unwrap();
        drop(seen);
    }
}
