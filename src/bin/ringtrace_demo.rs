//! ringtrace demo - producer threads against one drain loop
//!
//! Reproduces the classic sample topology: N workers emit alternating
//! events into a shared ring while a background drainer decodes and prints
//! them, then a stats summary is dumped.
//!
//! Usage:
//!     ringtrace-demo
//!     ringtrace-demo --producers 4 --capacity 256 --duration-ms 2000
//!     ringtrace-demo --quiet --json

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use ringtrace::{
    spawn_drain, DrainConfig, EmitStatus, Registry, TraceContext, TracepointDescriptor,
};

#[derive(Parser, Debug)]
#[command(name = "ringtrace-demo")]
#[command(about = "Run producer threads against one ringtrace drain loop")]
#[command(version)]
struct Args {
    /// Ring buffer capacity in bytes (power of two)
    #[arg(long, default_value_t = 2048)]
    capacity: usize,

    /// Number of producer threads
    #[arg(long, default_value_t = 2)]
    producers: usize,

    /// How long to run, in milliseconds
    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,

    /// Delay between emits per producer, in microseconds
    #[arg(long, default_value_t = 500)]
    emit_interval_us: u64,

    /// Print final stats as JSON
    #[arg(long)]
    json: bool,

    /// Suppress per-event output (stats only)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let quiet = args.quiet;
    let registry = match Registry::new(vec![
        TracepointDescriptor::new::<(u32, u64), _>("worker.tick", move |(worker, counter)| {
            if !quiet {
                println!("EVENT worker.tick -> worker {worker}, counter {counter}");
            }
        }),
        TracepointDescriptor::new::<u32, _>("worker.mark", move |worker| {
            if !quiet {
                println!("EVENT worker.mark -> worker {worker}");
            }
        }),
    ]) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error building registry: {e}");
            std::process::exit(1);
        }
    };

    let ctx = match TraceContext::new(registry, args.capacity) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Error creating trace context: {e}");
            std::process::exit(1);
        }
    };

    let drain = match spawn_drain(
        ctx.clone(),
        DrainConfig::default().poll_interval(Duration::from_millis(1)),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting drain loop: {e}");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let emit_interval = Duration::from_micros(args.emit_interval_us);

    let workers: Vec<_> = (0..args.producers as u32)
        .map(|worker| {
            let ctx = ctx.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut counter = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let status = if counter % 2 == 0 {
                        ctx.emit(0, &(worker, counter))
                    } else {
                        ctx.emit(1, &worker)
                    };
                    match status {
                        Ok(EmitStatus::Dropped) => log::debug!("worker {worker}: event dropped"),
                        Ok(_) => {}
                        Err(e) => {
                            eprintln!("worker {worker}: {e}");
                            break;
                        }
                    }
                    counter += 1;
                    thread::sleep(emit_interval);
                }
                counter
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(args.duration_ms));
    stop.store(true, Ordering::Relaxed);

    let mut emitted = 0u64;
    for worker in workers {
        emitted += worker.join().expect("producer thread panicked");
    }

    if let Err(e) = drain.join() {
        eprintln!("Drain loop failed: {e}");
        std::process::exit(1);
    }

    let stats = ctx.stats();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).expect("stats serialize")
        );
    } else {
        println!("--- ringtrace {} ---", ringtrace::VERSION);
        println!("emitted:   {emitted}");
        println!("committed: {}", stats.committed);
        println!("drained:   {}", stats.drained);
        println!("dropped:   {}", stats.dropped);
        println!("padding:   {} bytes", stats.padding_bytes);
    }
}
