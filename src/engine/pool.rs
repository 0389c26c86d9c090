// src/engine/pool.rs
//
// Bounded fan-out for per-row and per-column pixel work.
//
// Units are pushed onto a pre-filled queue and drained by
// min(hardware threads, configured cap, unit count) workers running on one
// lazily built global rayon pool. Every unit owns a disjoint piece of the
// output, so nothing inside a pass takes a lock except the queue itself.
//
// The concurrency cap is an explicit `Parallel` value handed to every pixel
// operation rather than a process-wide knob.

use parking_lot::Mutex;
use rayon::ThreadPool;
use std::collections::VecDeque;
use std::sync::OnceLock;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Global pool sized to the host. None only if the OS refused to spawn
/// threads, in which case work runs on the calling thread.
fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(hardware_parallelism())
                .thread_name(|i| format!("imgconv-px-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build worker pool, running serially");
                    None
                }
            }
        })
        .as_ref()
}

/// Uses available_parallelism() so cgroup CPU quotas are respected.
pub fn hardware_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_RAYON_THREADS)
}

/// Concurrency limit for pixel operations. `0` means "use every hardware
/// thread", which is also the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Parallel {
    max_workers: usize,
}

impl Parallel {
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self { max_workers }
    }

    /// Run everything on the calling thread.
    pub fn serial() -> Self {
        Self::with_max_workers(1)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of workers a call with `units` units will start.
    pub fn workers_for(&self, units: usize) -> usize {
        let hw = hardware_parallelism();
        let cap = if self.max_workers == 0 {
            hw
        } else {
            self.max_workers
        };
        hw.min(cap).min(units)
    }

    /// Invoke `f` exactly once for every index in `[start, stop)`.
    /// Blocks until all calls have returned; call order is unspecified.
    pub fn parallel<F>(&self, start: usize, stop: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        if start >= stop {
            return;
        }
        self.drain(start..stop, stop - start, f);
    }

    /// Hand each of the first `rows` rows of `pix` (rows are `stride` bytes
    /// apart) to `f` along with its index. The last row may be shorter than
    /// `stride` when the buffer has no trailing padding.
    pub fn for_each_row_mut<F>(&self, pix: &mut [u8], stride: usize, rows: usize, f: F)
    where
        F: Fn(usize, &mut [u8]) + Sync,
    {
        if stride == 0 || rows == 0 {
            return;
        }
        let units: VecDeque<(usize, &mut [u8])> =
            pix.chunks_mut(stride).take(rows).enumerate().collect();
        let n = units.len();
        self.drain(units, n, |(y, row)| f(y, row));
    }

    /// Compute `f(i)` for every index in `[start, stop)`, returning results in
    /// index order.
    pub fn map<T, F>(&self, start: usize, stop: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        if start >= stop {
            return Vec::new();
        }
        let mut slots: Vec<Option<T>> = (start..stop).map(|_| None).collect();
        let units: VecDeque<(usize, &mut Option<T>)> = slots.iter_mut().enumerate().collect();
        let n = units.len();
        self.drain(units, n, |(i, slot)| *slot = Some(f(start + i)));
        slots.into_iter().flatten().collect()
    }

    fn drain<T, I, F>(&self, units: I, count: usize, f: F)
    where
        T: Send,
        I: IntoIterator<Item = T>,
        F: Fn(T) + Sync,
    {
        let workers = self.workers_for(count);
        let pool = match get_pool() {
            Some(pool) if workers > 1 => pool,
            _ => {
                units.into_iter().for_each(f);
                return;
            }
        };
        tracing::trace!(units = count, workers, "parallel fan-out");

        let queue: Mutex<VecDeque<T>> = Mutex::new(units.into_iter().collect());
        let work = || loop {
            // Release the lock before running the unit.
            let next = queue.lock().pop_front();
            match next {
                Some(unit) => f(unit),
                None => break,
            }
        };
        pool.scope(|s| {
            for _ in 1..workers {
                s.spawn(|_| work());
            }
            work();
        });
    }
}
