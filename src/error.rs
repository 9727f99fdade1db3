//! Error types for flag-fetch
//!
//! Two families of errors live here:
//! - Run-scoped errors ([`Error`]) returned from configuration, setup and
//!   orchestration. Only [`Error::FatalAbort`] can end a run early.
//! - Item-scoped failures ([`FetchError`], [`ItemFailure`], [`ItemError`]) which
//!   never propagate out of a run. They are carried as data inside an
//!   [`Outcome`](crate::types::Outcome) and counted in the final report.

use std::path::PathBuf;
use thiserror::Error;

use crate::report::RunReport;
use crate::types::WorkItem;

/// Result type alias for flag-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for flag-fetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// A work item argument could not be understood
    #[error("invalid item {input:?}: {reason}")]
    InvalidItem {
        /// The raw argument as given
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a file failed
    #[error("failed to read {path}: {source}")]
    ReadFile {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The worker pool could not be started or is no longer accepting jobs
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// The limiter or scheduler became unusable mid-run.
    ///
    /// Carries the partial report built before the failure; items that never
    /// completed are listed in [`RunReport::not_completed`].
    #[error("run aborted: {cause}")]
    FatalAbort {
        /// Description of the non-item-scoped failure
        cause: String,
        /// Report of everything that completed before the abort
        report: Box<RunReport>,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error ended a run that had already started
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalAbort { .. })
    }

    /// The partial report attached to a fatal abort, if any
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            Error::FatalAbort { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Failure reported by a [`FetchSource`](crate::fetcher::FetchSource)
///
/// The `Display` output is the human-readable cause string recorded in
/// [`ItemError::cause`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote resource does not exist (HTTP 404)
    #[error("not found")]
    NotFound,

    /// Any other non-success status
    #[error("HTTP {status} - {reason}")]
    Status {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase, empty if unknown
        reason: String,
    },

    /// The connection could not be established or was dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport gave up waiting
    #[error("timeout")]
    Timeout,

    /// Anything else (body decoding, redirect loops, ...)
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Classify a reqwest error into a fetch failure
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status(status.as_u16())
        } else {
            FetchError::Other(err.to_string())
        }
    }

    /// Map a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        if status == 404 {
            return FetchError::NotFound;
        }
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        FetchError::Status { status, reason }
    }
}

/// The original failure behind an [`ItemError`]
#[derive(Debug, Error)]
pub enum ItemFailure {
    /// Fetching the payload failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The payload was fetched but could not be saved
    #[error("failed to save {name}: {source}")]
    Save {
        /// Artifact name passed to the store
        name: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Item-scoped error: which item failed, why, and the original failure
#[derive(Debug, Error)]
#[error("{item}: {cause}")]
pub struct ItemError {
    /// The item that failed
    pub item: WorkItem,
    /// Flat description captured at the point of failure
    pub cause: String,
    /// The failure itself
    #[source]
    pub failure: ItemFailure,
}

impl ItemError {
    /// Build an item error, capturing the failure's message as the cause
    pub fn new(item: WorkItem, failure: impl Into<ItemFailure>) -> Self {
        let failure = failure.into();
        Self {
            item,
            cause: failure.to_string(),
            failure,
        }
    }
}
