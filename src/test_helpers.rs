//! Shared test doubles for unit tests

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::Strategy;
use crate::error::FetchError;
use crate::fetcher::{ArtifactStore, FetchSource, ItemFetcher, TargetLayout};
use crate::progress::ProgressSink;
use crate::report::RunReport;
use crate::types::{Event, Outcome, RunState, WorkItem};

/// Base URL used by [`fetcher_with`]
pub(crate) const TEST_BASE_URL: &str = "http://example.test/flags";

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<WorkItem>>,
}

/// Fetch source with per-item scripted results
///
/// Items are recovered from the URL's file name (`br.gif` is `BR`). Unscripted
/// items succeed with their id as payload. Clones share the counters.
#[derive(Clone, Default)]
pub(crate) struct ScriptedSource {
    payloads: HashMap<String, Vec<u8>>,
    errors: HashMap<String, FetchError>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    delay: Duration,
    counters: Arc<Counters>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_payload(mut self, id: &str, bytes: &[u8]) -> Self {
        self.payloads.insert(id.to_string(), bytes.to_vec());
        self
    }

    pub(crate) fn with_error(mut self, id: &str, error: FetchError) -> Self {
        self.errors.insert(id.to_string(), error);
        self
    }

    pub(crate) fn with_panic(mut self, id: &str) -> Self {
        self.panics.insert(id.to_string());
        self
    }

    /// Delay applied to every item without its own delay
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Highest number of fetches observed running at once
    pub(crate) fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Items in the order their fetch started
    pub(crate) fn started(&self) -> Vec<WorkItem> {
        self.counters.started.lock().unwrap().clone()
    }

    fn item_of(url: &Url) -> String {
        let file = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        file.split('.').next().unwrap_or_default().to_uppercase()
    }
}

#[async_trait::async_trait]
impl FetchSource for ScriptedSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let id = Self::item_of(url);
        self.counters
            .started
            .lock()
            .unwrap()
            .push(WorkItem::new(id.as_str()));

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&id).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(&id) {
            panic!("scripted panic for {id}");
        }
        if let Some(error) = self.errors.get(&id) {
            return Err(error.clone());
        }
        Ok(self
            .payloads
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.into_bytes()))
    }
}

/// Store that keeps saved artifacts in memory
#[derive(Default)]
pub(crate) struct MemoryStore {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub(crate) fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Store that rejects every save
pub(crate) struct FailingStore;

#[async_trait::async_trait]
impl ArtifactStore for FailingStore {
    async fn save(&self, _name: &str, _bytes: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only store",
        ))
    }
}

/// Fetcher over [`TEST_BASE_URL`] with `.gif` artifacts
pub(crate) fn fetcher_with<S>(source: ScriptedSource, store: Arc<S>) -> ItemFetcher
where
    S: ArtifactStore + 'static,
{
    let layout = TargetLayout::new(Url::parse(TEST_BASE_URL).unwrap(), "gif");
    ItemFetcher::new(layout, Arc::new(source), store)
}

/// Cloneable in-memory writer
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub(crate) fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Progress sink that records every callback as an [`Event`]
#[derive(Default)]
pub(crate) struct RecordingProgress {
    events: Mutex<Vec<Event>>,
}

impl RecordingProgress {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn states(&self) -> Vec<RunState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressSink for RecordingProgress {
    fn run_started(&self, total: usize, concurrency: usize, strategy: Strategy) {
        self.push(Event::RunStarted {
            total,
            concurrency,
            strategy,
        });
    }

    fn item_completed(&self, outcome: &Outcome, completed: usize, total: usize) {
        self.push(Event::ItemCompleted {
            item: outcome.item.clone(),
            kind: outcome.kind(),
            cause: outcome.cause().map(str::to_string),
            completed,
            total,
        });
    }

    fn state_changed(&self, from: RunState, to: RunState) {
        self.push(Event::StateChanged { from, to });
    }

    fn run_finished(&self, report: &RunReport) {
        self.push(Event::RunFinished {
            success: report.success(),
            not_found: report.not_found(),
            errors: report.errors(),
            not_completed: report.not_completed.len(),
            aborted: report.aborted,
        });
    }
}
