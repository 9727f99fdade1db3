//! Progress sinks and verbose per-item output.
//!
//! The orchestrator drives a [`ProgressSink`] from its single completion
//! point; sinks still have to be `Send + Sync` because the orchestrator may
//! run on any runtime thread.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::config::Strategy;
use crate::report::RunReport;
use crate::types::{Event, Outcome, OutcomeStatus, RunState};

/// Receives "item completed" notifications and run-level hooks
pub trait ProgressSink: Send + Sync {
    /// Called once before any item is submitted
    fn run_started(&self, _total: usize, _concurrency: usize, _strategy: Strategy) {}

    /// Called once per completed item, in completion order
    fn item_completed(&self, outcome: &Outcome, completed: usize, total: usize);

    /// Called on every orchestrator state transition
    fn state_changed(&self, _from: RunState, _to: RunState) {}

    /// Called once with the final report
    fn run_finished(&self, _report: &RunReport) {}
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn item_completed(&self, _outcome: &Outcome, _completed: usize, _total: usize) {}
}

/// Logs progress through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn run_started(&self, total: usize, concurrency: usize, strategy: Strategy) {
        tracing::info!(total, concurrency, strategy = %strategy, "Run started");
    }

    fn item_completed(&self, outcome: &Outcome, completed: usize, total: usize) {
        tracing::info!(
            item = %outcome.item,
            kind = %outcome.kind(),
            completed,
            total,
            "Item completed"
        );
    }

    fn run_finished(&self, report: &RunReport) {
        tracing::info!(
            success = report.success(),
            not_found = report.not_found(),
            errors = report.errors(),
            aborted = report.aborted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Run finished"
        );
    }
}

/// Terminal progress bar on stderr
///
/// Sized from the run's total and advanced once per completed item. Pair it
/// with verbose output off; both write to the terminal.
#[derive(Clone, Debug)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Bar drawn on stderr
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Drive an existing bar, e.g. [`ProgressBar::hidden`]
    pub fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(bar_style());
        Self { bar }
    }

    /// The underlying bar
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressSink for BarProgress {
    fn run_started(&self, total: usize, concurrency: usize, strategy: Strategy) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_message(format!("{strategy}, {concurrency} at a time"));
    }

    fn item_completed(&self, _outcome: &Outcome, _completed: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
        }
        self.bar.inc(1);
    }

    fn run_finished(&self, report: &RunReport) {
        let message = if report.aborted { "aborted" } else { "done" };
        self.bar.finish_with_message(message);
    }
}

/// Publishes [`Event`]s on a broadcast channel
///
/// Sending never blocks; with no subscribers events are dropped.
#[derive(Clone, Debug)]
pub struct BroadcastProgress {
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl BroadcastProgress {
    /// Channel with room for `capacity` unread events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe as a stream
    ///
    /// A subscriber that falls behind loses the oldest events; the gap is
    /// logged and the stream carries on. The stream ends when every sender
    /// has been dropped.
    pub fn stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event subscriber lagged");
                None
            }
        })
    }
}

impl ProgressSink for BroadcastProgress {
    fn run_started(&self, total: usize, concurrency: usize, strategy: Strategy) {
        self.event_tx
            .send(Event::RunStarted {
                total,
                concurrency,
                strategy,
            })
            .ok();
    }

    fn item_completed(&self, outcome: &Outcome, completed: usize, total: usize) {
        self.event_tx
            .send(Event::ItemCompleted {
                item: outcome.item.clone(),
                kind: outcome.kind(),
                cause: outcome.cause().map(str::to_string),
                completed,
                total,
            })
            .ok();
    }

    fn state_changed(&self, from: RunState, to: RunState) {
        self.event_tx.send(Event::StateChanged { from, to }).ok();
    }

    fn run_finished(&self, report: &RunReport) {
        self.event_tx
            .send(Event::RunFinished {
                success: report.success(),
                not_found: report.not_found(),
                errors: report.errors(),
                not_completed: report.not_completed.len(),
                aborted: report.aborted,
            })
            .ok();
    }
}

/// Line-oriented `id outcome cause?` records
///
/// Each record is formatted up front and written with a single call while
/// holding the lock, so lines never interleave.
pub struct VerboseLog {
    out: Mutex<Box<dyn Write + Send>>,
}

impl VerboseLog {
    /// Log to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Log to any writer
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Format the record for one outcome
    pub fn format(outcome: &Outcome) -> String {
        match &outcome.status {
            OutcomeStatus::Success => format!("{} OK", outcome.item),
            OutcomeStatus::NotFound => format!("{} not found", outcome.item),
            OutcomeStatus::Error(e) => format!("*** Error for {}: {}", outcome.item, e.cause),
        }
    }

    /// Write the record for one outcome
    pub fn record(&self, outcome: &Outcome) {
        let line = format!("{}\n", Self::format(outcome));
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write verbose record");
        }
    }
}

impl std::fmt::Debug for VerboseLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerboseLog").finish_non_exhaustive()
    }
}
