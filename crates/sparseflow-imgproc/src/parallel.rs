use rayon::prelude::*;
use thiserror::Error;

use sparseflow_image::ImageError;

/// Amount of work (pixels or points) above which [`ExecutionStrategy::Auto`] goes parallel.
pub const AUTO_PARALLEL_THRESHOLD: usize = 64 * 64;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    /// The row length must be valid.
    #[error("row length must be > 0, got {0}")]
    InvalidRowLength(usize),
}

impl From<ParallelError> for ImageError {
    fn from(e: ParallelError) -> Self {
        ImageError::ExecutionFailed(e.to_string())
    }
}

/// Controls how parallel operations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Go parallel on the global Rayon pool only when the work is large enough.
    #[default]
    Auto,

    /// Run sequentially on the current thread.
    ///
    /// Useful for small images, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Always use the global Rayon thread pool.
    Parallel,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

impl ExecutionStrategy {
    /// Whether `work` units would be split across threads.
    pub fn is_parallel(&self, work: usize) -> bool {
        match self {
            ExecutionStrategy::Auto => work >= AUTO_PARALLEL_THRESHOLD,
            ExecutionStrategy::Serial => false,
            ExecutionStrategy::Parallel | ExecutionStrategy::Fixed(_) => true,
        }
    }
}

fn thread_pool(n: usize) -> Result<rayon::ThreadPool, ParallelError> {
    if n == 0 {
        return Err(ParallelError::InvalidThreadCount(n));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .map_err(|e| ParallelError::BuildError(e.to_string()))
}

/// Apply `f` to every row of a row-major buffer.
///
/// Each call receives the row index and the `row_len` elements of that row, so workers
/// only ever write their own row. The output does not depend on the thread schedule.
///
/// # Arguments
///
/// * `strategy` - The execution strategy.
/// * `data` - The destination buffer, a multiple of `row_len` long.
/// * `row_len` - The number of elements between the start of two rows.
/// * `work` - Total amount of work, used by [`ExecutionStrategy::Auto`].
/// * `f` - The per-row operation.
pub fn par_rows_mut<T, F>(
    strategy: ExecutionStrategy,
    data: &mut [T],
    row_len: usize,
    work: usize,
    f: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    if row_len == 0 {
        return Err(ParallelError::InvalidRowLength(row_len));
    }

    match strategy {
        ExecutionStrategy::Fixed(n) => {
            thread_pool(n)?.install(|| {
                data.par_chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(y, row)| f(y, row))
            });
        }
        s if s.is_parallel(work) => {
            data.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(y, row)| f(y, row));
        }
        _ => {
            data.chunks_mut(row_len)
                .enumerate()
                .for_each(|(y, row)| f(y, row));
        }
    }
    Ok(())
}

/// Apply `f` to every item of a slice, with its index.
///
/// Used to partition a point index range across workers.
pub fn par_items_mut<T, F>(
    strategy: ExecutionStrategy,
    items: &mut [T],
    f: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut T) + Send + Sync,
{
    match strategy {
        ExecutionStrategy::Fixed(n) => {
            thread_pool(n)?.install(|| {
                items
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, item)| f(i, item))
            });
        }
        s if s.is_parallel(items.len()) => {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, item)| f(i, item));
        }
        _ => {
            items.iter_mut().enumerate().for_each(|(i, item)| f(i, item));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_serial() -> Result<(), ParallelError> {
        let mut data = vec![0; 6];
        par_rows_mut(ExecutionStrategy::Serial, &mut data, 3, 6, |y, row| {
            row.iter_mut().enumerate().for_each(|(x, v)| *v = y * 10 + x);
        })?;
        assert_eq!(data, vec![0, 1, 2, 10, 11, 12]);
        Ok(())
    }

    #[test]
    fn test_rows_parallel_matches_serial() -> Result<(), ParallelError> {
        let mut serial = vec![0u32; 64 * 48];
        let mut parallel = vec![0u32; 64 * 48];
        let op = |y: usize, row: &mut [u32]| {
            row.iter_mut()
                .enumerate()
                .for_each(|(x, v)| *v = (x * 31 + y * 17) as u32)
        };
        par_rows_mut(ExecutionStrategy::Serial, &mut serial, 64, 64 * 48, op)?;
        par_rows_mut(ExecutionStrategy::Parallel, &mut parallel, 64, 64 * 48, op)?;
        assert_eq!(serial, parallel);
        Ok(())
    }

    #[test]
    fn test_rows_invalid() {
        let mut data = vec![0u8; 4];
        let res = par_rows_mut(ExecutionStrategy::Serial, &mut data, 0, 4, |_, _| {});
        assert_eq!(res, Err(ParallelError::InvalidRowLength(0)));
    }

    #[test]
    fn test_items_fixed() -> Result<(), ParallelError> {
        let mut items = vec![0usize; 5];
        par_items_mut(ExecutionStrategy::Fixed(2), &mut items, |i, v| *v = i * 2)?;
        assert_eq!(items, vec![0, 2, 4, 6, 8]);
        Ok(())
    }

    #[test]
    fn test_items_fixed_error() {
        let mut items = vec![0u8; 1];
        let res = par_items_mut(ExecutionStrategy::Fixed(0), &mut items, |_, _| {});
        assert_eq!(res, Err(ParallelError::InvalidThreadCount(0)));
    }

    #[test]
    fn test_auto_threshold() {
        assert!(!ExecutionStrategy::Auto.is_parallel(10));
        assert!(ExecutionStrategy::Auto.is_parallel(AUTO_PARALLEL_THRESHOLD));
        assert!(!ExecutionStrategy::Serial.is_parallel(usize::MAX));
    }
}
