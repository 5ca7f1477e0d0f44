//! Fixed-size worker pool for per-channel work, with results merged by
//! channel index.

use std::ops::Range;

use rayon::prelude::*;

use crate::error::{Error, Result};

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {

    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize { self.workers }

    /// Run `op` inside the pool, so that any parallel iterators it uses are
    /// limited to this pool's workers
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Evaluate `f(i)` for every `i` in `0..n`, splitting the indices into
    /// one contiguous chunk per worker. The `i`th result lands in the `i`th
    /// slot whichever chunk finishes first. The first failure aborts the map.
    pub fn map_indexed<T, F>(&self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let run_chunk = |chunk: Range<usize>| -> Result<Vec<(usize, T)>> {
            chunk.map(|i| {
                f(i).map(|t| (i, t))
                    .map_err(|e| Error::Worker { channel: i, source: Box::new(e) })
            }).collect()
        };
        let done = self.install(|| {
            chunks(n, self.workers)
                .into_par_iter()
                .map(run_chunk)
                .collect::<Result<Vec<_>>>()
        })?;

        let mut slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
        for (i, t) in done.into_iter().flatten() {
            slots[i] = Some(t);
        }
        let missing = slots.iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect::<Vec<_>>();
        if !missing.is_empty() { return Err(Error::MissingChannels(missing)) }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Split `0..n` into at most `parts` contiguous, non-empty ranges of nearly
/// equal length
pub fn chunks(n: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, n.max(1));
    let (size, extra) = (n / parts, n % parts);
    let mut start = 0;
    (0..parts)
        .map(|p| {
            let len = size + usize::from(p < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Number of workers: an explicit request wins over the hint given by the
/// batch scheduler, which wins over the parallelism of the machine.
pub fn resolve_worker_count(explicit: Option<usize>, scheduler_hint: Option<usize>) -> usize {
    explicit.filter(|&n| n > 0)
        .or(scheduler_hint.filter(|&n| n > 0))
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

/// Interpret a scheduler's CPU count, such as the value of
/// `SLURM_CPUS_ON_NODE`
pub fn parse_scheduler_hint(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.trim().parse().ok())
}
