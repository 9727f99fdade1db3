//! Run orchestration: submit, drain, aggregate, report.
//!
//! The orchestrator is the single consumer of limiter completions. It owns the
//! tally and the set of pending items, so aggregation needs no locking.
//!
//! ```text
//! Idle -> Submitting -> Draining -> Done
//!            |             |
//!            +-------------+------> Aborted  (cancellation or limiter fault)
//! ```

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConcurrencyConfig, Strategy};
use crate::error::{Error, Result};
use crate::fetcher::ItemFetcher;
use crate::limiter::{self, Completion, Limiter, LimiterFault};
use crate::progress::{NoProgress, ProgressSink, VerboseLog};
use crate::report::{RunReport, Tally};
use crate::types::{Outcome, RunState, WorkItem};

/// Drives one batch of items through a limiter
pub struct Orchestrator {
    fetcher: Arc<ItemFetcher>,
    concurrency: ConcurrencyConfig,
    progress: Arc<dyn ProgressSink>,
    verbose: Option<Arc<VerboseLog>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with no progress output
    pub fn new(fetcher: Arc<ItemFetcher>, concurrency: ConcurrencyConfig) -> Self {
        Self {
            fetcher,
            concurrency,
            progress: Arc::new(NoProgress),
            verbose: None,
            cancel: CancellationToken::new(),
        }
    }

    /// HTTP fetcher, concurrency and verbosity from configuration
    ///
    /// Verbose runs write one line per item to stdout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Arc::new(ItemFetcher::from_config(config)?);
        let mut orchestrator = Self::new(fetcher, config.concurrency.clone());
        if config.output.verbose {
            orchestrator.verbose = Some(Arc::new(VerboseLog::stdout()));
        }
        Ok(orchestrator)
    }

    /// Replace the progress sink
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Emit one verbose record per completed item
    pub fn with_verbose(mut self, verbose: Arc<VerboseLog>) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Token that cancels runs of this orchestrator
    ///
    /// Once cancelled it stays cancelled: later runs submit nothing and come
    /// back aborted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Strategy this orchestrator runs with
    pub fn strategy(&self) -> Strategy {
        self.concurrency.strategy
    }

    /// Concurrency a run over `item_count` items would use
    pub fn concurrency_for(&self, item_count: usize) -> usize {
        self.concurrency.effective(item_count)
    }

    /// Process every item and return the aggregate report
    ///
    /// Items are de-duplicated and submitted in sorted order. Item failures
    /// never end the run; they are counted. Cancellation returns `Ok` with
    /// [`RunReport::aborted`] set. A limiter fault returns
    /// [`Error::FatalAbort`] carrying the partial report.
    pub async fn run(&self, items: impl IntoIterator<Item = WorkItem>) -> Result<RunReport> {
        let items = sorted_unique(items);
        let strategy = self.concurrency.strategy;
        let concurrency = self.concurrency.effective(items.len());
        let mut run = RunTracker::new(&items, strategy, concurrency, Arc::clone(&self.progress));

        self.progress.run_started(items.len(), concurrency, strategy);
        tracing::info!(
            total = items.len(),
            concurrency,
            strategy = %strategy,
            "Starting run"
        );

        // Child token so a fault can stop this run's queued work without
        // cancelling the caller's token
        let run_cancel = self.cancel.child_token();

        let mut limiter = match limiter::build(
            strategy,
            concurrency,
            Arc::clone(&self.fetcher),
            run_cancel.clone(),
        ) {
            Ok(limiter) => limiter,
            Err(e) => return Err(self.fatal(run, e.to_string())),
        };

        match self.drive(limiter.as_mut(), items, &mut run, &run_cancel).await {
            Ok(()) => {
                limiter.shutdown().await;
                let aborted = run_cancel.is_cancelled() || run.has_pending();
                run.transition(if aborted {
                    RunState::Aborted
                } else {
                    RunState::Done
                });
                let report = run.into_report(aborted);
                tracing::info!(
                    success = report.success(),
                    not_found = report.not_found(),
                    errors = report.errors(),
                    aborted,
                    "Run finished"
                );
                self.progress.run_finished(&report);
                Ok(report)
            }
            Err(fault) => {
                run_cancel.cancel();
                limiter.shutdown().await;
                Err(self.fatal(run, fault.to_string()))
            }
        }
    }

    async fn drive(
        &self,
        limiter: &mut dyn Limiter,
        items: Vec<WorkItem>,
        run: &mut RunTracker,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), LimiterFault> {
        run.transition(RunState::Submitting);
        for item in items {
            if cancel.is_cancelled() {
                tracing::warn!(
                    pending = run.pending_count(),
                    "Run cancelled, no further items will be submitted"
                );
                break;
            }
            limiter.submit(item).await?;
            while let Some(completion) = limiter.try_next()? {
                self.record(run, completion);
            }
        }

        run.transition(RunState::Draining);
        while let Some(completion) = limiter.next().await? {
            self.record(run, completion);
        }
        Ok(())
    }

    fn record(&self, run: &mut RunTracker, completion: Completion) {
        match completion {
            Completion::Finished(outcome) => {
                if let Some(verbose) = &self.verbose {
                    verbose.record(&outcome);
                }
                run.finish(&outcome);
            }
            Completion::Skipped(item) => {
                tracing::warn!(item = %item, "Item skipped after cancellation");
            }
        }
    }

    fn fatal(&self, mut run: RunTracker, cause: String) -> Error {
        run.transition(RunState::Aborted);
        let report = run.into_report(true);
        tracing::error!(
            cause = %cause,
            not_completed = report.not_completed.len(),
            "Run aborted"
        );
        self.progress.run_finished(&report);
        Error::FatalAbort {
            cause,
            report: Box::new(report),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("fetcher", &self.fetcher)
            .field("concurrency", &self.concurrency)
            .field("verbose", &self.verbose.is_some())
            .finish_non_exhaustive()
    }
}

fn sorted_unique(items: impl IntoIterator<Item = WorkItem>) -> Vec<WorkItem> {
    let mut seen = BTreeSet::new();
    for item in items {
        if let Some(dup) = seen.replace(item) {
            tracing::warn!(item = %dup, "Duplicate item ignored");
        }
    }
    seen.into_iter().collect()
}

/// Mutable state of one run, touched only from the drain point
struct RunTracker {
    state: RunState,
    tally: Tally,
    pending: BTreeSet<WorkItem>,
    total: usize,
    strategy: Strategy,
    concurrency: usize,
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
    progress: Arc<dyn ProgressSink>,
}

impl RunTracker {
    fn new(
        items: &[WorkItem],
        strategy: Strategy,
        concurrency: usize,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            state: RunState::Idle,
            tally: Tally::new(),
            pending: items.iter().cloned().collect(),
            total: items.len(),
            strategy,
            concurrency,
            started_at: Utc::now(),
            clock: Instant::now(),
            progress,
        }
    }

    fn transition(&mut self, to: RunState) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::debug!(from = ?from, to = ?to, "Run state changed");
        self.state = to;
        self.progress.state_changed(from, to);
    }

    fn finish(&mut self, outcome: &Outcome) {
        if !self.pending.remove(&outcome.item) {
            tracing::warn!(item = %outcome.item, "Outcome for an item that was not pending");
            return;
        }
        self.tally.record(outcome.kind());
        let completed = self.tally.total();
        tracing::debug!(
            item = %outcome.item,
            kind = %outcome.kind(),
            completed,
            total = self.total,
            "Item completed"
        );
        self.progress.item_completed(outcome, completed, self.total);
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn into_report(self, aborted: bool) -> RunReport {
        RunReport {
            tally: self.tally,
            total: self.total,
            not_completed: self.pending.into_iter().collect(),
            aborted,
            strategy: self.strategy,
            concurrency: self.concurrency,
            started_at: self.started_at,
            elapsed: self.clock.elapsed(),
        }
    }
}
