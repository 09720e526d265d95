//! Worker pool - fixed threads, FIFO queue, wait-all barrier

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    /// Enqueued-but-unfinished jobs, including ones currently executing.
    outstanding: usize,
    stop: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    task_available: Condvar,
    all_idle: Condvar,
}

/// A fixed pool of worker threads draining an unbounded FIFO of closures.
///
/// There is no priority, cancellation or affinity. `wait_all` is the only
/// synchronization primitive offered: it blocks the caller until every job
/// enqueued so far has finished, which is what the phase barriers of the
/// chunk scheduler and the mesh extractor need.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

fn lock_state(shared: &PoolShared) -> MutexGuard<'_, PoolState> {
    shared.state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerPool {
    /// Pool sized to the machine's available parallelism.
    pub fn new() -> Self {
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::with_threads(threads)
    }

    /// Pool with an explicit thread count (1 gives FIFO-ordered execution,
    /// which the deterministic replay tests rely on).
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                outstanding: 0,
                stop: false,
            }),
            task_available: Condvar::new(),
            all_idle: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        log::debug!("Worker pool started with {} threads", threads);
        Self { shared, workers }
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Returns immediately.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = lock_state(&self.shared);
            state.queue.push_back(Box::new(job));
            state.outstanding += 1;
        }
        self.shared.task_available.notify_one();
    }

    /// Block until the queue is empty and every job has finished.
    pub fn wait_all(&self) {
        let mut state = lock_state(&self.shared);
        while state.outstanding > 0 {
            state = self
                .shared
                .all_idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn worker_loop(shared: &PoolShared) {
    let mut state = lock_state(shared);
    loop {
        if let Some(job) = state.queue.pop_front() {
            drop(state);
            job();
            state = lock_state(shared);
            state.outstanding -= 1;
            if state.outstanding == 0 {
                shared.all_idle.notify_all();
            }
        } else if state.stop {
            return;
        } else {
            state = shared
                .task_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = lock_state(&self.shared);
            state.stop = true;
        }
        self.shared.task_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_all_jobs() {
        let pool = WorkerPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.wait_all();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_single_thread_preserves_fifo_order() {
        let pool = WorkerPool::with_threads(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let order = Arc::clone(&order);
            pool.enqueue(move || {
                order.lock().unwrap().push(i);
            });
        }
        pool.wait_all();
        let order = order.lock().unwrap();
        assert_eq!(*order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_wait_all_with_empty_queue_returns() {
        let pool = WorkerPool::with_threads(2);
        pool.wait_all();
    }

    #[test]
    fn test_reusable_after_wait() {
        let pool = WorkerPool::with_threads(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for round in 0..3 {
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                pool.enqueue(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            pool.wait_all();
            assert_eq!(counter.load(Ordering::Relaxed), (round + 1) * 10);
        }
    }

    #[test]
    fn test_drop_joins_cleanly() {
        let pool = WorkerPool::with_threads(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.wait_all();
        drop(pool);
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_zero_threads_clamps_to_one() {
        let pool = WorkerPool::with_threads(0);
        assert_eq!(pool.threads(), 1);
    }
}
