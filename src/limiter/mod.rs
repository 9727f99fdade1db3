//! Admission control for item fetches.
//!
//! A [`Limiter`] bounds how many [`ItemFetcher::process`] calls run at once.
//! Three realisations share the contract and differ only in their
//! scheduling substrate:
//!
//! - [`SerialLimiter`]: capacity one, processes each item inside `submit`
//! - [`PoolLimiter`]: fixed pool of OS threads fed by an unbounded queue
//! - [`AdmissionLimiter`]: one task per item, gated by a semaphore
//!
//! Completions come back in latency order, not submission order. Once the
//! run's cancellation token fires, items that have not started yet are
//! reported as [`Completion::Skipped`] instead of being fetched.

mod admission;
mod pool;
mod serial;

pub use admission::AdmissionLimiter;
pub use pool::{MapResults, PoolLimiter, WorkerPool};
pub use serial::SerialLimiter;

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Strategy;
use crate::error::Result;
use crate::fetcher::ItemFetcher;
use crate::types::{Outcome, WorkItem};

/// Terminal state of one submitted item
#[derive(Debug)]
pub enum Completion {
    /// The item was processed
    Finished(Outcome),
    /// The run was cancelled before the item started
    Skipped(WorkItem),
}

/// Non-item-scoped failure that leaves a limiter unusable
#[derive(Debug, Error)]
pub enum LimiterFault {
    /// The worker pool stopped accepting jobs
    #[error("worker pool is closed")]
    PoolClosed,

    /// A worker panicked while processing an item
    #[error("worker panicked while processing {item}")]
    Panicked {
        /// Item being processed at the time
        item: WorkItem,
    },

    /// The admission semaphore was closed
    #[error("admission semaphore closed")]
    SemaphoreClosed,

    /// A spawned task failed to complete
    #[error("task failed: {0}")]
    Task(String),
}

/// Bounded admission of items into [`ItemFetcher::process`]
#[async_trait::async_trait]
pub trait Limiter: Send {
    /// Scheduling strategy
    fn strategy(&self) -> Strategy;

    /// Maximum concurrent `process` calls, fixed for the limiter's lifetime
    fn capacity(&self) -> usize;

    /// Hand one item to the limiter
    async fn submit(&mut self, item: WorkItem) -> std::result::Result<(), LimiterFault>;

    /// Next completion if one is ready, without waiting
    fn try_next(&mut self) -> std::result::Result<Option<Completion>, LimiterFault>;

    /// Wait for the next completion; `None` when nothing is outstanding
    async fn next(&mut self) -> std::result::Result<Option<Completion>, LimiterFault>;

    /// Release workers and tasks once every completion has been consumed
    async fn shutdown(self: Box<Self>);
}

/// Build the limiter for `strategy` with `capacity` slots
///
/// `capacity` is raised to one if zero.
pub fn build(
    strategy: Strategy,
    capacity: usize,
    fetcher: Arc<ItemFetcher>,
    cancel: CancellationToken,
) -> Result<Box<dyn Limiter>> {
    let capacity = capacity.max(1);
    let limiter: Box<dyn Limiter> = match strategy {
        Strategy::Serial => Box::new(SerialLimiter::new(fetcher)),
        Strategy::ThreadPool => Box::new(PoolLimiter::new(capacity, fetcher, cancel)?),
        Strategy::Cooperative => Box::new(AdmissionLimiter::new(capacity, fetcher, cancel)),
    };
    tracing::debug!(strategy = %strategy, capacity = limiter.capacity(), "Limiter ready");
    Ok(limiter)
}
