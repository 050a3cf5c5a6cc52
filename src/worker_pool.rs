//! # Worker Pool Module
//!
//! A fixed set of `may` coroutines sharing one job queue. The server submits
//! one job per accepted connection; whichever worker is free picks it up and
//! runs the whole request pipeline on it.
//!
//! ## Queue policy
//!
//! - [`QueueMode::Unbounded`]: every submission is queued. Memory, not the
//!   pool, is the limit under overload.
//! - [`QueueMode::Shed`]: a submission is refused with [`SubmitError::Shed`]
//!   once `workers + queue_bound` jobs are in flight or waiting. The job is
//!   handed back so the caller can answer it.
//!
//! ## Metrics
//!
//! [`WorkerPoolMetrics`] tracks accepted, shed, dropped and completed jobs
//! plus the current queue depth, all as relaxed atomics.

use may::coroutine::JoinHandle;
use may::sync::mpsc;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::QueueMode;

/// Sizing and queue policy for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub workers: usize,
    pub queue_mode: QueueMode,
    /// Waiting jobs tolerated beyond one per worker in `QueueMode::Shed`
    pub queue_bound: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl From<&crate::config::ServerConfig> for WorkerPoolConfig {
    fn from(config: &crate::config::ServerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            queue_mode: config.queue_mode,
            queue_bound: config.queue_bound,
            stack_size: config.stack_size,
        }
    }
}

/// Counters for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    accepted: AtomicU64,
    shed: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    /// Accepted and not yet finished; the shed decision reads only this
    pending: AtomicUsize,
}

impl WorkerPoolMetrics {
    fn record_submit(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_start(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    fn record_dropped(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Jobs accepted into the queue
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Jobs refused because the queue was full
    #[must_use]
    pub fn shed(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }

    /// Queued jobs discarded during shutdown
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Jobs waiting for a worker
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Jobs a worker is currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Why a job was not queued. The job is handed back either way.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError<T> {
    #[error("worker pool queue is full")]
    Shed(T),
    #[error("worker pool is shut down")]
    Closed(T),
}

impl<T> SubmitError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SubmitError::Shed(job) | SubmitError::Closed(job) => job,
        }
    }
}

/// What travels down the queue: a job, or the order for one worker to exit.
enum Message<T> {
    Job(T),
    Close,
}

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker coroutines.
///
/// Dropping the pool closes the queue: jobs still waiting are discarded and
/// each worker exits after finishing the job it is running.
pub struct WorkerPool<T: Send + 'static> {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Message<T>>,
    metrics: Arc<WorkerPoolMetrics>,
    stopping: Arc<AtomicBool>,
    /// Workers that were started; each one needs its own `Close`
    spawned: usize,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `config.workers` coroutines, each running `job_fn` on the jobs it receives.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if a worker coroutine cannot be started. Workers
    /// started before the failure are shut down first.
    pub fn new<F>(name: &str, config: WorkerPoolConfig, job_fn: F) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_spawner(name, config, job_fn, spawn_coroutine)
    }

    fn with_spawner<F, S>(
        name: &str,
        config: WorkerPoolConfig,
        job_fn: F,
        mut spawn: S,
    ) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
        S: FnMut(String, usize, WorkerBody) -> io::Result<JoinHandle<()>>,
    {
        let (tx, rx) = mpsc::channel::<Message<T>>();
        let rx = Arc::new(rx);
        let job_fn = Arc::new(job_fn);

        info!(
            pool = %name,
            workers = config.workers,
            queue_mode = ?config.queue_mode,
            queue_bound = config.queue_bound,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        let mut pool = Self {
            workers: Vec::with_capacity(config.workers),
            config,
            sender: tx,
            metrics: Arc::new(WorkerPoolMetrics::default()),
            stopping: Arc::new(AtomicBool::new(false)),
            spawned: 0,
        };

        for worker_id in 0..pool.config.workers {
            let rx = Arc::clone(&rx);
            let job_fn = Arc::clone(&job_fn);
            let metrics = Arc::clone(&pool.metrics);
            let worker_stopping = Arc::clone(&pool.stopping);
            let pool_name = name.to_string();

            let body: WorkerBody = Box::new(move || {
                debug!(pool = %pool_name, worker_id, "Worker coroutine started");

                while let Ok(Message::Job(job)) = rx.recv() {
                    metrics.record_start();
                    if worker_stopping.load(Ordering::Acquire) {
                        drop(job);
                        metrics.record_dropped();
                        continue;
                    }

                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| job_fn(job))) {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_string());
                        error!(
                            pool = %pool_name,
                            worker_id,
                            panic_message = %message,
                            "Job panicked"
                        );
                    }
                    metrics.record_completion();
                }

                debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
            });

            match spawn(format!("{name}-worker-{worker_id}"), pool.config.stack_size, body) {
                Ok(handle) => {
                    pool.workers.push(handle);
                    pool.spawned += 1;
                }
                Err(e) => {
                    error!(pool = %name, worker_id, error = %e, "Failed to spawn worker coroutine");
                    // dropping the partial pool closes the workers already running
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Queue a job for the next free worker.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Shed`] when the pool is in shed mode and full,
    /// [`SubmitError::Closed`] when every worker has exited.
    pub fn submit(&self, job: T) -> Result<(), SubmitError<T>> {
        if self.config.queue_mode == QueueMode::Shed {
            let pending = self.metrics.pending.load(Ordering::Acquire);
            if pending >= self.config.workers + self.config.queue_bound {
                self.metrics.shed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    pending,
                    workers = self.config.workers,
                    queue_bound = self.config.queue_bound,
                    "Worker pool full; shedding"
                );
                return Err(SubmitError::Shed(job));
            }
        }

        self.metrics.record_submit();
        self.sender.send(Message::Job(job)).map_err(|e| {
            self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
            self.metrics.pending.fetch_sub(1, Ordering::AcqRel);
            error!("Worker pool channel disconnected");
            match e.0 {
                Message::Job(job) => SubmitError::Closed(job),
                Message::Close => unreachable!("only jobs are submitted"),
            }
        })
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<WorkerPoolMetrics> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Whether shutdown has begun; set once and never cleared.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Close the queue and wait for every worker to finish its current job.
    pub fn join(mut self) {
        let workers = std::mem::take(&mut self.workers);
        drop(self);
        for handle in workers {
            if handle.join().is_err() {
                error!("Worker coroutine ended abnormally");
            }
        }
    }

    /// Flag shutdown and queue one `Close` per started worker.
    ///
    /// The channel is FIFO, so jobs queued earlier are drained (and dropped)
    /// before a worker sees its `Close`.
    fn close(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        for _ in 0..self.spawned {
            if self.sender.send(Message::Close).is_err() {
                break;
            }
        }
    }
}

fn spawn_coroutine(name: String, stack_size: usize, body: WorkerBody) -> io::Result<JoinHandle<()>> {
    // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
    // The body owns everything it touches (Arc clones and the shared receiver),
    // and job panics are caught inside the loop so they never unwind the coroutine.
    unsafe {
        may::coroutine::Builder::new()
            .name(name)
            .stack_size(stack_size)
            .spawn(body)
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        debug!(
            queued = self.metrics.queue_depth(),
            in_flight = self.metrics.in_flight(),
            workers = self.spawned,
            "Worker pool shutting down"
        );
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: usize, queue_mode: QueueMode, queue_bound: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers,
            queue_mode,
            queue_bound,
            stack_size: 0x10000,
        }
    }

    #[test]
    fn test_shed_refuses_when_full() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(release_rx);
        let pool = WorkerPool::new("test", config(1, QueueMode::Shed, 0), move |_job: u32| {
            let _ = release_rx.recv();
        })
        .unwrap();

        pool.submit(1).unwrap();
        match pool.submit(2) {
            Err(SubmitError::Shed(job)) => assert_eq!(job, 2),
            other => panic!("expected shed, got {other:?}"),
        }
        assert_eq!(pool.metrics().shed(), 1);
        assert_eq!(pool.metrics().accepted(), 1);

        release_tx.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_spawn_failure_closes_started_workers() {
        let (exit_tx, exit_rx) = std::sync::mpsc::channel::<String>();
        let mut attempts = 0;
        let result = WorkerPool::with_spawner(
            "failing",
            config(3, QueueMode::Unbounded, 0),
            |_job: u32| {},
            |name, stack_size, body: WorkerBody| {
                attempts += 1;
                if attempts > 1 {
                    return Err(io::Error::new(io::ErrorKind::Other, "no stacks left"));
                }
                let exit_tx = exit_tx.clone();
                let worker = name.clone();
                spawn_coroutine(
                    name,
                    stack_size,
                    Box::new(move || {
                        body();
                        let _ = exit_tx.send(worker);
                    }),
                )
            },
        );

        let err = result.err().expect("second spawn must fail");
        assert_eq!(err.to_string(), "no stacks left");
        assert_eq!(attempts, 2);
        // the worker that did start only returns once it was told to close
        let exited = exit_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("started worker was not shut down");
        assert_eq!(exited, "failing-worker-0");
    }

    #[test]
    fn test_close_sets_flag_once() {
        let pool = WorkerPool::new("flag", config(2, QueueMode::Unbounded, 0), |_job: u32| {})
            .unwrap();
        assert!(!pool.is_stopping());
        pool.close();
        assert!(pool.is_stopping());
        // a second close sends nothing more and leaves the flag set
        pool.close();
        assert!(pool.is_stopping());
        pool.join();
    }

    #[test]
    fn test_submit_error_hands_job_back() {
        assert_eq!(SubmitError::Shed("job").into_inner(), "job");
        assert_eq!(SubmitError::Closed(7).into_inner(), 7);
        assert_eq!(
            SubmitError::Shed(()).to_string(),
            "worker pool queue is full"
        );
    }
}
