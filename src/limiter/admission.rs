//! Semaphore-gated tasks on the ambient tokio runtime.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Completion, Limiter, LimiterFault};
use crate::config::Strategy;
use crate::fetcher::ItemFetcher;
use crate::types::WorkItem;

type TaskResult = Result<Completion, LimiterFault>;

/// Spawns one task per item; a task holds a permit for the whole of
/// [`ItemFetcher::process`], so at most `capacity` run at once
///
/// On a current-thread runtime this is single-threaded cooperative
/// multitasking: tasks interleave only at await points.
pub struct AdmissionLimiter {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<TaskResult>,
    fetcher: Arc<ItemFetcher>,
    cancel: CancellationToken,
    capacity: usize,
}

impl AdmissionLimiter {
    /// Create a limiter with `capacity` permits
    pub fn new(capacity: usize, fetcher: Arc<ItemFetcher>, cancel: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            fetcher,
            cancel,
            capacity,
        }
    }

    /// Permits not currently held by a running item
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn joined(
        result: Option<Result<TaskResult, tokio::task::JoinError>>,
    ) -> Result<Option<Completion>, LimiterFault> {
        match result {
            None => Ok(None),
            Some(Ok(task)) => task.map(Some),
            Some(Err(e)) => Err(LimiterFault::Task(e.to_string())),
        }
    }
}

async fn admit_and_process(
    item: WorkItem,
    semaphore: Arc<Semaphore>,
    fetcher: Arc<ItemFetcher>,
    cancel: CancellationToken,
) -> TaskResult {
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(Completion::Skipped(item)),
        permit = semaphore.acquire_owned() => {
            permit.map_err(|_| LimiterFault::SemaphoreClosed)?
        }
    };

    let outcome = AssertUnwindSafe(fetcher.process(&item))
        .catch_unwind()
        .await
        .map_err(|_| LimiterFault::Panicked { item: item.clone() });
    drop(permit);
    Ok(Completion::Finished(outcome?))
}

#[async_trait::async_trait]
impl Limiter for AdmissionLimiter {
    fn strategy(&self) -> Strategy {
        Strategy::Cooperative
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn submit(&mut self, item: WorkItem) -> Result<(), LimiterFault> {
        if self.semaphore.is_closed() {
            return Err(LimiterFault::SemaphoreClosed);
        }
        self.tasks.spawn(admit_and_process(
            item,
            Arc::clone(&self.semaphore),
            Arc::clone(&self.fetcher),
            self.cancel.clone(),
        ));
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<Completion>, LimiterFault> {
        Self::joined(self.tasks.try_join_next())
    }

    async fn next(&mut self) -> Result<Option<Completion>, LimiterFault> {
        Self::joined(self.tasks.join_next().await)
    }

    async fn shutdown(self: Box<Self>) {
        let mut this = self;
        this.semaphore.close();
        this.tasks.shutdown().await;
    }
}
