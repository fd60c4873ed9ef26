//! Stress driver for `RbTree`.
//!
//! Runs inserting, lock-holding, removing and searching threads against one
//! tree for a bounded number of operations, with a watchdog that reports
//! threads stalled on a lock, then checks the red-black invariants.
//!
//! Run with:
//! ```bash
//! RBINDEX_THREADS=8 RBINDEX_OPS=100000 RBINDEX_KEYS=10000 cargo run --release
//!
//! # with structural events logged
//! RUST_LOG=rbindex=debug cargo run --features tracing
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]

use rbindex::{LockMode, RbTree};
use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct StressConfig {
    threads: usize,
    ops_per_thread: usize,
    key_space: u64,
}

impl StressConfig {
    fn from_env() -> Self {
        fn read(name: &str, default: usize) -> usize {
            env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(default)
        }

        Self {
            threads: read("RBINDEX_THREADS", 6).max(4),
            ops_per_thread: read("RBINDEX_OPS", 20_000),
            key_space: read("RBINDEX_KEYS", 100_000) as u64,
        }
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .compact()
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

// =============================================================================
// Thread progress tracking for hang detection
// =============================================================================

struct ThreadProgress {
    last_progress_ms: Vec<AtomicU64>,
    current_key: Vec<AtomicU64>,
    done: Vec<AtomicBool>,
    start: Instant,
}

impl ThreadProgress {
    fn new(threads: usize) -> Self {
        Self {
            last_progress_ms: (0..threads).map(|_| AtomicU64::new(0)).collect(),
            current_key: (0..threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, t: usize, key: u64) {
        self.current_key[t].store(key, Ordering::Relaxed);
        self.last_progress_ms[t].store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn mark_done(&self, t: usize) {
        self.done[t].store(true, Ordering::Relaxed);
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }

    fn report_stuck(&self, timeout_ms: u64) {
        let now_ms = self.start.elapsed().as_millis() as u64;
        for (t, last) in self.last_progress_ms.iter().enumerate() {
            if self.done[t].load(Ordering::Relaxed) {
                continue;
            }
            let stall = now_ms.saturating_sub(last.load(Ordering::Relaxed));
            if stall > timeout_ms {
                let key = self.current_key[t].load(Ordering::Relaxed);
                eprintln!("!!! STUCK: thread {t} at key {key} for {stall}ms");
            }
        }
    }
}

const WATCHDOG_TICK: Duration = Duration::from_millis(500);

/// Report stalled threads every `tick` until all workers finish or `stop`
/// is raised. A panicked worker never marks itself done, so the caller
/// raises `stop` after joining the workers.
fn run_watchdog(progress: &ThreadProgress, stop: &AtomicBool, tick: Duration) {
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(tick);
        progress.report_stuck(2_000);
        if progress.all_done() {
            break;
        }
    }
}

// =============================================================================
// Workers
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Role {
    Insert,
    InsertAndHold,
    Remove,
    Search,
}

impl Role {
    const fn for_thread(t: usize) -> Self {
        match t % 4 {
            0 => Self::Insert,
            1 => Self::InsertAndHold,
            2 => Self::Remove,
            _ => Self::Search,
        }
    }
}

#[derive(Default)]
struct Tally {
    inserted: AtomicUsize,
    removed: AtomicUsize,
    found: AtomicUsize,
    contended: AtomicUsize,
}

fn run_worker(
    t: usize,
    tree: &RbTree<u64>,
    config: StressConfig,
    progress: &ThreadProgress,
    tally: &Tally,
) {
    let role = Role::for_thread(t);
    let mut state = (t as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);

    for op in 0..config.ops_per_thread {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        let raw = (state >> 16) % config.key_space;
        let key = raw as i64;
        progress.update(t, raw);

        match role {
            Role::Insert => {
                if !tree.insert(key, op as u64, LockMode::None).is_replaced() {
                    tally.inserted.fetch_add(1, Ordering::Relaxed);
                }
            }
            Role::InsertAndHold => {
                let outcome = tree.insert(key, op as u64, LockMode::Blocking);
                if !outcome.is_replaced() {
                    tally.inserted.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(mut guard) = outcome.into_access().into_guard() {
                    *guard = guard.wrapping_add(1);
                    thread::yield_now();
                }
            }
            Role::Remove => {
                if tree.remove(key).is_ok() {
                    tally.removed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Role::Search => match tree.search(key, LockMode::Try) {
                Ok(access) if access.is_contended() => {
                    tally.contended.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {
                    tally.found.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {}
            },
        }
    }

    progress.mark_done(t);
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    init_tracing();

    let config = StressConfig::from_env();
    eprintln!("rbindex stress: {config:?}");

    let tree: RbTree<u64> = RbTree::with_capacity(config.key_space as usize);
    let progress = ThreadProgress::new(config.threads);
    let tally = Tally::default();
    let start = Instant::now();

    let stop_watchdog = AtomicBool::new(false);

    let panicked = thread::scope(|s| {
        let watchdog = s.spawn(|| run_watchdog(&progress, &stop_watchdog, WATCHDOG_TICK));

        let workers: Vec<_> = (0..config.threads)
            .map(|t| {
                let (tree, progress, tally) = (&tree, &progress, &tally);
                s.spawn(move || run_worker(t, tree, config, progress, tally))
            })
            .collect();

        let panicked = workers.into_iter().filter_map(|w| w.join().err()).count();

        stop_watchdog.store(true, Ordering::Relaxed);
        let _ = watchdog.join();
        panicked
    });

    if panicked > 0 {
        eprintln!("{panicked} worker thread(s) panicked");
        return ExitCode::FAILURE;
    }

    let elapsed = start.elapsed();
    let total_ops = config.threads * config.ops_per_thread;
    let inserted = tally.inserted.load(Ordering::Relaxed);
    let removed = tally.removed.load(Ordering::Relaxed);

    println!(
        "{total_ops} ops in {elapsed:?} ({:.0} ops/sec): inserted {inserted}, removed {removed}, \
         found {}, contended {}, len {}",
        total_ops as f64 / elapsed.as_secs_f64(),
        tally.found.load(Ordering::Relaxed),
        tally.contended.load(Ordering::Relaxed),
        tree.len()
    );

    if inserted - removed != tree.len() {
        eprintln!("count mismatch: {inserted} - {removed} != {}", tree.len());
        return ExitCode::FAILURE;
    }

    match tree.verify() {
        Ok(height) => {
            println!("invariants hold, black height {height}");
            ExitCode::SUCCESS
        }
        Err(violation) => {
            eprintln!("invariant violated: {violation}");
            ExitCode::FAILURE
        }
    }
}
