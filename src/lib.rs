//! # flag-fetch
//!
//! Bounded-concurrency batch fetcher. Give it a list of work items (country
//! codes); it fetches each item's flag image, saves it locally, classifies the
//! outcome and returns an aggregate report.
//!
//! ## Design Philosophy
//!
//! - **Bounded** - at most `concurrency` fetches are ever in flight
//! - **Failure-tolerant** - a missing or broken item is counted, never fatal
//! - **Strategy-agnostic** - serial, thread pool and cooperative tasks share one
//!   contract and produce identical counts
//! - **Observable** - per-item progress callbacks and a broadcast event stream
//!
//! ## Quick Start
//!
//! ```no_run
//! use flag_fetch::{Config, Orchestrator, ServerPreset, Strategy, codes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.source.server = ServerPreset::Remote;
//!     config.concurrency.strategy = Strategy::Cooperative;
//!
//!     let items = codes::select(&config.selection)?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!     let report = orchestrator.run(items).await?;
//!     println!("{report}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Work item selection
pub mod codes;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-item fetch, save and classify
pub mod fetcher;
/// Admission control strategies
pub mod limiter;
/// Run orchestration
pub mod orchestrator;
/// Progress sinks and verbose output
pub mod progress;
/// Outcome tallies and reports
pub mod report;
/// Background text spinner
pub mod spinner;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{
    ConcurrencyConfig, Config, OutputConfig, SelectionConfig, ServerPreset, SourceConfig,
    Strategy, effective_concurrency,
};
pub use error::{Error, FetchError, ItemError, ItemFailure, Result};
pub use fetcher::{ArtifactStore, DirStore, FetchSource, HttpSource, ItemFetcher, TargetLayout};
pub use limiter::{Limiter, WorkerPool};
pub use orchestrator::Orchestrator;
pub use progress::{
    BarProgress, BroadcastProgress, LogProgress, NoProgress, ProgressSink, VerboseLog,
};
pub use report::{RunReport, Tally, initial_report};
pub use spinner::{Spinner, ThreadSpinner, supervise, supervise_blocking};
pub use types::{Event, Outcome, OutcomeKind, OutcomeStatus, RunState, WorkItem};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when a termination signal arrives.
///
/// Spawns a background task and returns its handle. In-flight items finish;
/// items not yet started are reported as not completed.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use flag_fetch::{Config, Orchestrator, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = Orchestrator::from_config(&Config::default())?;
///     let _signals = cancel_on_signal(orchestrator.cancel_token());
///
///     let report = orchestrator.run(flag_fetch::codes::pop20()).await?;
///     println!("{report}");
///     Ok(())
/// }
/// ```
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                tracing::info!(signal, "Shutdown signal, cancelling run");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Resolves with the name of the first shutdown signal received
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut term), Ok(mut int)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        },
        (Err(e), Ok(mut int)) => {
            tracing::warn!(error = %e, "SIGTERM unavailable, run stops on SIGINT only");
            int.recv().await;
            "SIGINT"
        }
        (Ok(mut term), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT unavailable, run stops on SIGTERM only");
            term.recv().await;
            "SIGTERM"
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "No unix signal handlers, run stops on Ctrl+C");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            "Ctrl+C"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the run can only end on its own
        tracing::warn!(error = %e, "Ctrl+C unavailable, run cannot be interrupted");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
