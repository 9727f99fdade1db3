//! Mock flag servers, instrumented sources and config builders

use flag_fetch::{Config, FetchError, FetchSource, Strategy};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Body served for every flag that exists
pub const FLAG_BYTES: &[u8] = b"GIF89a-test-flag";

/// Mock flag site under `/flags`
///
/// - `AA`, `DD`, `EE` exist
/// - `BB` is missing (404)
/// - `CC` is broken (503)
pub async fn flag_server() -> MockServer {
    let server = MockServer::start().await;

    for cc in ["aa", "dd", "ee"] {
        Mock::given(method("GET"))
            .and(path(format!("/flags/{cc}/{cc}.gif")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(FLAG_BYTES))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/flags/bb/bb.gif"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flags/cc/cc.gif"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    server
}

/// Config pointing at `server` and saving into `dest`
pub fn config_for(server: &MockServer, dest: &Path, strategy: Strategy, max: usize) -> Config {
    let mut config = Config::default();
    config.source.base_url = Some(format!("{}/flags", server.uri()));
    config.source.request_timeout = Duration::from_secs(5);
    config.output.dest_dir = dest.to_path_buf();
    config.concurrency.strategy = strategy;
    config.concurrency.max_concurrency = Some(max);
    config
}

/// Fetch source that records how many fetches run at once
///
/// Every fetch optionally waits on a gate before finishing; open the gate
/// with [`CountingSource::release`].
#[derive(Clone)]
pub struct CountingSource {
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl CountingSource {
    /// Each fetch sleeps for `delay` then succeeds
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            gate: None,
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            started: Arc::default(),
        }
    }

    /// Each fetch blocks until [`release`](Self::release) is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::with_delay(Duration::ZERO)
        }
    }

    /// Let every current and future fetch through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Fetches started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` fetches have started
    pub async fn wait_for_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("fetches did not start in time");
    }
}

#[async_trait::async_trait]
impl FetchSource for CountingSource {
    async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| FetchError::Other(e.to_string()))?
                .forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(FLAG_BYTES.to_vec())
    }
}
