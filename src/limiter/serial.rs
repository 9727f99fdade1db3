//! Capacity-one limiter: the correctness baseline.

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::{Completion, Limiter, LimiterFault};
use crate::config::Strategy;
use crate::fetcher::ItemFetcher;
use crate::types::WorkItem;

/// Processes each item to completion inside [`Limiter::submit`]
///
/// Completion order is submission order.
pub struct SerialLimiter {
    fetcher: Arc<ItemFetcher>,
    ready: VecDeque<Completion>,
}

impl SerialLimiter {
    /// Create a serial limiter
    pub fn new(fetcher: Arc<ItemFetcher>) -> Self {
        Self {
            fetcher,
            ready: VecDeque::new(),
        }
    }
}

#[async_trait::async_trait]
impl Limiter for SerialLimiter {
    fn strategy(&self) -> Strategy {
        Strategy::Serial
    }

    fn capacity(&self) -> usize {
        1
    }

    async fn submit(&mut self, item: WorkItem) -> Result<(), LimiterFault> {
        let outcome = AssertUnwindSafe(self.fetcher.process(&item))
            .catch_unwind()
            .await
            .map_err(|_| LimiterFault::Panicked { item: item.clone() })?;
        self.ready.push_back(Completion::Finished(outcome));
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<Completion>, LimiterFault> {
        Ok(self.ready.pop_front())
    }

    async fn next(&mut self) -> Result<Option<Completion>, LimiterFault> {
        Ok(self.ready.pop_front())
    }

    async fn shutdown(self: Box<Self>) {}
}
