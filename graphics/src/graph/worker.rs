//! Bounded worker pool that records task nodes in parallel mode.

use crate::error::GraphError;

/// A fixed-size pool of worker threads, sized once at construction.
///
/// Backed by a dedicated `rayon` pool so graph work never competes with the
/// global pool.
///
/// # Example
///
/// ```
/// use tandem_graphics::WorkerPool;
///
/// let pool = WorkerPool::new(2).unwrap();
///
/// let mut results = vec![0u32; 4];
/// pool.scope(|s| {
///     for (i, slot) in results.iter_mut().enumerate() {
///         s.spawn(move |_| {
///             *slot = (i as u32) * 10;
///         });
///     }
/// });
/// assert_eq!(results, vec![0, 10, 20, 30]);
/// ```
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Create a pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Result<Self, GraphError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("tandem: worker {i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Create a pool sized to the number of available CPU cores.
    pub fn with_default_threads() -> Result<Self, GraphError> {
        Self::new(Self::default_threads())
    }

    /// Number of available CPU cores, or one if unknown.
    pub fn default_threads() -> usize {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` on the calling thread with a scope whose spawned tasks run on
    /// the pool.
    ///
    /// Returns once `f` and every task spawned in the scope have finished. A
    /// panic in any task is resumed on the calling thread.
    pub fn scope<'scope, F, R>(&self, f: F) -> R
    where
        F: FnOnce(&rayon::Scope<'scope>) -> R,
    {
        self.pool.in_place_scope(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_thread_count() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.num_threads(), 3);
    }

    #[test]
    fn test_zero_threads_clamped() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.num_threads(), 1);
    }

    #[test]
    fn test_scope_waits_for_nested_spawns() {
        let pool = WorkerPool::new(2).unwrap();
        let counter = AtomicUsize::new(0);

        pool.scope(|s| {
            for _ in 0..4 {
                s.spawn(|s| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    s.spawn(|_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_scope_returns_value() {
        let pool = WorkerPool::new(1).unwrap();
        assert_eq!(pool.scope(|_| 42), 42);
    }
}
