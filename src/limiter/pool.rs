//! Fixed-size OS thread pool and the limiter built on it.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, mpsc};
use tokio::sync::mpsc as async_mpsc;
use tokio_util::sync::CancellationToken;

use super::{Completion, Limiter, LimiterFault};
use crate::config::Strategy;
use crate::error::{Error, Result};
use crate::fetcher::ItemFetcher;
use crate::types::WorkItem;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool of worker threads sharing one unbounded job queue
///
/// Submitting never blocks. A job that panics is logged and the worker keeps
/// serving the queue. Dropping the pool closes the queue; workers exit after
/// draining it. Use [`WorkerPool::join`] to wait for them.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` workers named `<name>-<n>`
    pub fn new(size: usize, name: &str) -> Result<Self> {
        if size == 0 {
            return Err(Error::WorkerPool("pool size must be at least 1".into()));
        }

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for n in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{n}"))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::WorkerPool("pool is shut down".into()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| Error::WorkerPool("all workers have exited".into()))
    }

    /// Run `f` over `inputs` on the pool
    ///
    /// All inputs are queued at once; the returned iterator yields results
    /// in input order, blocking on each until it is ready.
    pub fn map<T, R, F>(
        &self,
        f: F,
        inputs: impl IntoIterator<Item = T>,
    ) -> Result<MapResults<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut pending = VecDeque::new();
        for input in inputs {
            let (tx, rx) = mpsc::sync_channel(1);
            let f = Arc::clone(&f);
            self.execute(move || {
                tx.send(f(input)).ok();
            })?;
            pending.push_back(rx);
        }
        Ok(MapResults { pending })
    }

    /// Close the queue and wait for every worker to exit
    pub fn join(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(str::to_string);
            if worker.join().is_err() {
                tracing::warn!(worker = ?name, "Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.workers.len())
            .finish_non_exhaustive()
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };
        // Queue closed and drained
        let Ok(job) = job else { break };
        if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("Job panicked on worker thread");
        }
    }
}

/// Ordered results of [`WorkerPool::map`]
pub struct MapResults<R> {
    pending: VecDeque<mpsc::Receiver<R>>,
}

impl<R> Iterator for MapResults<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        let rx = self.pending.pop_front()?;
        Some(
            rx.recv()
                .map_err(|_| Error::WorkerPool("job panicked before producing a result".into())),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

type PoolMessage = std::result::Result<Completion, LimiterFault>;

/// Limiter backed by a [`WorkerPool`] of `capacity` threads
///
/// Workers drive the async [`ItemFetcher`] through the runtime handle that
/// was current when the limiter was built, so the caller must be inside a
/// tokio runtime. Completions funnel through one channel to the consumer.
pub struct PoolLimiter {
    pool: WorkerPool,
    fetcher: Arc<ItemFetcher>,
    runtime: tokio::runtime::Handle,
    cancel: CancellationToken,
    done_tx: async_mpsc::UnboundedSender<PoolMessage>,
    done_rx: async_mpsc::UnboundedReceiver<PoolMessage>,
    outstanding: usize,
}

impl PoolLimiter {
    /// Start a pool of `capacity` workers
    pub fn new(
        capacity: usize,
        fetcher: Arc<ItemFetcher>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::WorkerPool(format!("thread pool strategy needs a tokio runtime: {e}"))
        })?;
        let pool = WorkerPool::new(capacity, "fetch-worker")?;
        let (done_tx, done_rx) = async_mpsc::unbounded_channel();
        Ok(Self {
            pool,
            fetcher,
            runtime,
            cancel,
            done_tx,
            done_rx,
            outstanding: 0,
        })
    }

    fn received(
        &mut self,
        message: PoolMessage,
    ) -> std::result::Result<Option<Completion>, LimiterFault> {
        self.outstanding -= 1;
        message.map(Some)
    }
}

#[async_trait::async_trait]
impl Limiter for PoolLimiter {
    fn strategy(&self) -> Strategy {
        Strategy::ThreadPool
    }

    fn capacity(&self) -> usize {
        self.pool.size()
    }

    async fn submit(&mut self, item: WorkItem) -> std::result::Result<(), LimiterFault> {
        let fetcher = Arc::clone(&self.fetcher);
        let runtime = self.runtime.clone();
        let cancel = self.cancel.clone();
        let done_tx = self.done_tx.clone();

        self.pool
            .execute(move || {
                let message = if cancel.is_cancelled() {
                    Ok(Completion::Skipped(item))
                } else {
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        runtime.block_on(fetcher.process(&item))
                    }));
                    match result {
                        Ok(outcome) => Ok(Completion::Finished(outcome)),
                        Err(_) => Err(LimiterFault::Panicked { item }),
                    }
                };
                done_tx.send(message).ok();
            })
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to queue job");
                LimiterFault::PoolClosed
            })?;

        self.outstanding += 1;
        Ok(())
    }

    fn try_next(&mut self) -> std::result::Result<Option<Completion>, LimiterFault> {
        if self.outstanding == 0 {
            return Ok(None);
        }
        match self.done_rx.try_recv() {
            Ok(message) => self.received(message),
            Err(async_mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(async_mpsc::error::TryRecvError::Disconnected) => Err(LimiterFault::PoolClosed),
        }
    }

    async fn next(&mut self) -> std::result::Result<Option<Completion>, LimiterFault> {
        if self.outstanding == 0 {
            return Ok(None);
        }
        match self.done_rx.recv().await {
            Some(message) => self.received(message),
            None => Err(LimiterFault::PoolClosed),
        }
    }

    async fn shutdown(self: Box<Self>) {
        let pool = self.pool;
        if let Err(e) = tokio::task::spawn_blocking(move || pool.join()).await {
            tracing::warn!(error = %e, "Failed to join worker pool");
        }
    }
}
