//! Per-phase worker pools
//!
//! Every phase builds its own short-lived rayon pool, spawns one task per
//! partition inside a scope and returns once all of them have finished.
//! Leaving the scope is the phase barrier.

use crate::partition::Partition;
use lahar_core::{Error, Result};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of worker threads per phase
pub const DEFAULT_THREADS: usize = 4;

/// Bounded retry with exponential backoff for pool startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each later one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the zero-based attempt number. The last failure is
/// reported as [`Error::WorkerPool`].
pub fn retry_with_backoff<T, E, F>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    E: Display,
    F: FnMut(u32) -> std::result::Result<T, E>,
{
    let attempts = policy.attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            warn!(attempt, ?delay, reason = %last_reason, "retrying worker pool startup");
            std::thread::sleep(delay);
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => last_reason = e.to_string(),
        }
    }

    Err(Error::WorkerPool {
        attempts,
        reason: last_reason,
    })
}

/// Builder for the pool of one phase
#[derive(Debug, Clone)]
pub struct PhasePool {
    name: &'static str,
    threads: usize,
    retry: RetryPolicy,
}

impl PhasePool {
    /// Pool for phase `name` with `threads` workers (at least one)
    pub fn new(name: &'static str, threads: usize) -> Self {
        Self {
            name,
            threads: threads.max(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Start the pool, retrying transient spawn failures.
    pub fn build(&self) -> Result<rayon::ThreadPool> {
        let name = self.name;
        retry_with_backoff(self.retry, |_| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(move |i| format!("lahar-{name}-{i}"))
                .build()
        })
    }

    /// Run `work` once per item on a fresh pool and wait for all of them.
    ///
    /// Results come back in item order. When several workers fail, a
    /// cyclic-graph error wins over any other kind, otherwise the first
    /// failing item's error is returned.
    pub fn run<I, T, F>(&self, items: Vec<I>, work: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync,
    {
        let workers = items.len();
        let pool = self.build()?;
        debug!(phase = self.name, workers, threads = self.threads, "phase start");

        let mut slots: Vec<Option<Result<T>>> = (0..workers).map(|_| None).collect();
        let work = &work;
        pool.scope(|scope| {
            for (slot, item) in slots.iter_mut().zip(items) {
                scope.spawn(move |_| *slot = Some(work(item)));
            }
        });

        let results = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::Algorithm("worker did not report".into()))));
        collect_results(results)
    }

    /// Run `work` once per partition; see [`PhasePool::run`].
    pub fn run_partitions<T, F>(&self, partitions: &[Partition], work: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Partition) -> Result<T> + Sync,
    {
        self.run(partitions.iter().collect(), work)
    }
}

fn collect_results<T>(results: impl Iterator<Item = Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::new();
    let mut failure: Option<Error> = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                let replace = match &failure {
                    None => true,
                    Some(current) => err.is_cyclic() && !current.is_cyclic(),
                };
                if replace {
                    failure = Some(err);
                }
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, split_rows_mut};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retry_succeeds_after_failures() {
        let calls = AtomicUsize::new(0);
        let value = retry_with_backoff(quick(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            if attempt < 2 {
                Err("resource temporarily unavailable")
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let err = retry_with_backoff(quick(), |_| Err::<(), _>("no threads")).unwrap_err();
        match err {
            Error::WorkerPool { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "no threads");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = quick();
        assert_eq!(policy.backoff(1), Duration::from_millis(1));
        assert_eq!(policy.backoff(2), Duration::from_millis(2));
        assert_eq!(policy.backoff(3), Duration::from_millis(4));
    }

    #[test]
    fn test_run_partitions_in_order() {
        let parts = partition(100, 4);
        let sums = PhasePool::new("test", 4)
            .run_partitions(&parts, |p| Ok(p.range.clone().sum::<usize>()))
            .unwrap();
        assert_eq!(sums.len(), 4);
        assert_eq!(sums.iter().sum::<usize>(), (0..100).sum::<usize>());
        assert_eq!(sums[0], (0..25).sum::<usize>());
    }

    #[test]
    fn test_run_writes_disjoint_rows() {
        let (rows, cols) = (7, 5);
        let mut data = vec![0usize; rows * cols];
        let parts = partition(rows, 3);
        let blocks = split_rows_mut(&mut data, cols, &parts);
        let items: Vec<_> = parts.iter().zip(blocks).collect();
        PhasePool::new("rows", 3)
            .run(items, |(part, block)| {
                for (offset, value) in block.iter_mut().enumerate() {
                    *value = part.range.start * cols + offset;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(data, (0..rows * cols).collect::<Vec<_>>());
    }

    #[test]
    fn test_cyclic_error_preferred() {
        let parts = partition(3, 3);
        let err = PhasePool::new("errors", 3)
            .run_partitions(&parts, |p| -> Result<()> {
                match p.index {
                    0 => Err(Error::Algorithm("aborted".into())),
                    1 => Err(Error::CyclicFlowGraph {
                        row: 1,
                        col: 1,
                        unresolved: 2,
                    }),
                    _ => Ok(()),
                }
            })
            .unwrap_err();
        assert!(err.is_cyclic());
    }
}
