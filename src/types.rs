//! Core types for flag-fetch

use serde::{Deserialize, Serialize};

use crate::config::Strategy;
use crate::error::ItemError;

/// One unit of input work, e.g. a country code
///
/// The id is opaque to the orchestrator; only the
/// [`ItemFetcher`](crate::fetcher::ItemFetcher) derives targets from it.
/// Ids are case-insensitive and stored uppercase, so `"br"` and `"BR"` are
/// the same item with the same target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct WorkItem(String);

impl WorkItem {
    /// Create a new WorkItem
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_uppercase())
    }

    /// Get the normalised id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used for remote paths and file names
    pub fn slug(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkItem {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<WorkItem> for String {
    fn from(item: WorkItem) -> Self {
        item.0
    }
}

/// Outcome classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Payload fetched and saved
    Success,
    /// The remote resource does not exist
    NotFound,
    /// Transport, protocol or save failure
    Error,
}

impl OutcomeKind {
    /// All kinds, in report order
    pub const ALL: [OutcomeKind; 3] = [
        OutcomeKind::Success,
        OutcomeKind::NotFound,
        OutcomeKind::Error,
    ];
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::NotFound => "not found",
            OutcomeKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// Classified result of processing one item
#[derive(Debug)]
pub enum OutcomeStatus {
    /// Payload fetched and saved
    Success,
    /// The remote resource does not exist
    NotFound,
    /// The item failed; the error carries the flattened cause
    Error(ItemError),
}

/// Result of processing exactly one [`WorkItem`]
#[derive(Debug)]
pub struct Outcome {
    /// The item this outcome belongs to
    pub item: WorkItem,
    /// What happened
    pub status: OutcomeStatus,
}

impl Outcome {
    /// Successful outcome
    pub fn success(item: WorkItem) -> Self {
        Self {
            item,
            status: OutcomeStatus::Success,
        }
    }

    /// Not-found outcome
    pub fn not_found(item: WorkItem) -> Self {
        Self {
            item,
            status: OutcomeStatus::NotFound,
        }
    }

    /// Failed outcome
    pub fn error(error: ItemError) -> Self {
        Self {
            item: error.item.clone(),
            status: OutcomeStatus::Error(error),
        }
    }

    /// The outcome's kind
    pub fn kind(&self) -> OutcomeKind {
        match self.status {
            OutcomeStatus::Success => OutcomeKind::Success,
            OutcomeStatus::NotFound => OutcomeKind::NotFound,
            OutcomeStatus::Error(_) => OutcomeKind::Error,
        }
    }

    /// Cause string for failed outcomes
    pub fn cause(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Error(e) => Some(&e.cause),
            _ => None,
        }
    }
}

/// Orchestrator run state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Nothing submitted yet
    Idle,
    /// Handing items to the limiter
    Submitting,
    /// Waiting for outstanding completions
    Draining,
    /// Every item produced an outcome
    Done,
    /// Cancelled or failed before every item completed
    Aborted,
}

/// Events emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run is about to start submitting items
    RunStarted {
        /// Number of distinct items in the run
        total: usize,
        /// Effective concurrency
        concurrency: usize,
        /// Scheduling strategy in use
        strategy: Strategy,
    },

    /// The orchestrator moved between states
    StateChanged {
        /// Previous state
        from: RunState,
        /// New state
        to: RunState,
    },

    /// One item completed (emitted in completion order)
    ItemCompleted {
        /// The item
        item: WorkItem,
        /// How it ended
        kind: OutcomeKind,
        /// Cause for failed items
        cause: Option<String>,
        /// Items completed so far, including this one
        completed: usize,
        /// Total items in the run
        total: usize,
    },

    /// The run finished (successfully or not)
    RunFinished {
        /// Successful items
        success: usize,
        /// Not-found items
        not_found: usize,
        /// Failed items
        errors: usize,
        /// Items that never produced an outcome
        not_completed: usize,
        /// Whether the run was cut short
        aborted: bool,
    },
}
