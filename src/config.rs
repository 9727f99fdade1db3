//! Configuration types for flag-fetch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Scheduling strategy used to bound concurrent fetches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One item at a time, in submission order
    Serial,
    /// Fixed pool of OS worker threads
    ThreadPool,
    /// One lightweight task per item, gated by a semaphore
    #[default]
    Cooperative,
}

impl Strategy {
    /// Concurrency used when none is requested
    pub fn default_concurrency(&self) -> usize {
        match self {
            Strategy::Serial => 1,
            Strategy::ThreadPool => 30,
            Strategy::Cooperative => 5,
        }
    }

    /// Upper bound this strategy accepts
    pub fn max_concurrency(&self) -> usize {
        match self {
            Strategy::Serial => 1,
            Strategy::ThreadPool | Strategy::Cooperative => 1000,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Strategy::Serial => "serial",
            Strategy::ThreadPool => "thread pool",
            Strategy::Cooperative => "cooperative",
        };
        f.write_str(label)
    }
}

/// Well-known flag servers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPreset {
    /// Public site
    Remote,
    /// Local mirror
    #[default]
    Local,
    /// Local mirror behind a delaying proxy
    Delay,
    /// Local mirror behind an error-injecting proxy
    Error,
}

impl ServerPreset {
    /// Base URL of the preset
    pub fn url(&self) -> &'static str {
        match self {
            ServerPreset::Remote => "http://flupy.org/data/flags",
            ServerPreset::Local => "http://localhost:8001/flags",
            ServerPreset::Delay => "http://localhost:8002/flags",
            ServerPreset::Error => "http://localhost:8003/flags",
        }
    }

    /// Uppercase label used in the initial report
    pub fn label(&self) -> &'static str {
        match self {
            ServerPreset::Remote => "REMOTE",
            ServerPreset::Local => "LOCAL",
            ServerPreset::Delay => "DELAY",
            ServerPreset::Error => "ERROR",
        }
    }
}

/// Where payloads come from and how they are requested
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Server preset (default: local)
    #[serde(default)]
    pub server: ServerPreset,

    /// Explicit base URL; overrides `server` when set
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// File extension of remote and saved artifacts (default: "gif")
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            server: ServerPreset::default(),
            base_url: None,
            request_timeout: default_request_timeout(),
            file_extension: default_file_extension(),
        }
    }
}

/// Concurrency settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Scheduling strategy (default: cooperative)
    #[serde(default)]
    pub strategy: Strategy,

    /// Requested concurrency (default: the strategy's default)
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Hard ceiling (default: the strategy's maximum)
    #[serde(default)]
    pub hard_ceiling: Option<usize>,
}

impl ConcurrencyConfig {
    /// Concurrency for a run over `item_count` items
    ///
    /// Serial runs are always capped at one.
    pub fn effective(&self, item_count: usize) -> usize {
        let configured = self
            .max_concurrency
            .unwrap_or_else(|| self.strategy.default_concurrency());
        let ceiling = match self.strategy {
            Strategy::Serial => 1,
            _ => self
                .hard_ceiling
                .unwrap_or_else(|| self.strategy.max_concurrency()),
        };
        effective_concurrency(configured, ceiling, item_count)
    }
}

/// `min(configured, ceiling, item_count)`
pub fn effective_concurrency(configured: usize, ceiling: usize, item_count: usize) -> usize {
    configured.min(ceiling).min(item_count)
}

/// Output settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination directory for saved artifacts (default: "./downloads")
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,

    /// Print one line per completed item instead of aggregate progress
    #[serde(default)]
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dest_dir: default_dest_dir(),
            verbose: false,
        }
    }
}

/// Which items to fetch
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Code arguments: "A".."Z" expands to a letter's 26 codes, "AA".."ZZ" is literal
    #[serde(default)]
    pub codes: Vec<String>,

    /// Select every code from AA to ZZ
    #[serde(default)]
    pub every: bool,

    /// Read whitespace-separated codes from this file
    #[serde(default)]
    pub all_from: Option<PathBuf>,

    /// Keep only the first `limit` codes after sorting
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Main configuration
///
/// Sub-configs are flattened so the JSON form has no nesting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote source settings
    #[serde(flatten)]
    pub source: SourceConfig,

    /// Concurrency settings
    #[serde(flatten)]
    pub concurrency: ConcurrencyConfig,

    /// Output settings
    #[serde(flatten)]
    pub output: OutputConfig,

    /// Item selection
    #[serde(flatten)]
    pub selection: SelectionConfig,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.concurrency.max_concurrency == Some(0) {
            return Err(Error::config(
                "max_concurrency",
                "max_concurrency must be at least 1",
            ));
        }
        if self.concurrency.hard_ceiling == Some(0) {
            return Err(Error::config(
                "hard_ceiling",
                "hard_ceiling must be at least 1",
            ));
        }
        if self.source.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout",
                "request_timeout must be greater than zero",
            ));
        }
        if self.source.file_extension.is_empty() || self.source.file_extension.contains('/') {
            return Err(Error::config(
                "file_extension",
                format!("invalid file extension {:?}", self.source.file_extension),
            ));
        }
        Ok(())
    }

    /// Resolved base URL (explicit URL, else the preset's)
    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .source
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.source.server.url());
        let url = Url::parse(raw)
            .map_err(|e| Error::config("base_url", format!("invalid base URL {raw:?}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::config(
                "base_url",
                format!("{raw:?} cannot be used as a base URL"),
            ));
        }
        Ok(url)
    }

    /// Label printed in the initial report
    pub fn server_label(&self) -> &str {
        if self.source.base_url.is_some() {
            "CUSTOM"
        } else {
            self.source.server.label()
        }
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_file_extension() -> String {
    "gif".to_string()
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
