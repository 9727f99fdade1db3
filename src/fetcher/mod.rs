//! Per-item fetch, save and classify.
//!
//! [`ItemFetcher::process`] wraps the two external collaborators, a
//! [`FetchSource`] and an [`ArtifactStore`], into a single operation that
//! always returns an [`Outcome`]. Transport and I/O failures become data.

mod blocking;
mod http;
mod store;

pub use blocking::{BlockingFetch, BlockingSource};
pub use http::HttpSource;
pub use store::DirStore;

use std::sync::Arc;
use url::Url;

use crate::config::Config;
use crate::error::{FetchError, ItemError, ItemFailure, Result};
use crate::types::{Outcome, WorkItem};

/// Abstraction over the transport, enabling testability
#[async_trait::async_trait]
pub trait FetchSource: Send + Sync {
    /// Fetch the payload at `url`
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Abstraction over local persistence
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under `name`
    async fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Derives remote and local targets from an item id
#[derive(Clone, Debug)]
pub struct TargetLayout {
    base_url: Url,
    extension: String,
}

impl TargetLayout {
    /// Layout rooted at `base_url`, artifacts named `<id>.<extension>`
    pub fn new(base_url: Url, extension: impl Into<String>) -> Self {
        Self {
            base_url,
            extension: extension.into(),
        }
    }

    /// `{base}/{id}/{id}.{ext}` with a lowercase id
    pub fn url_for(&self, item: &WorkItem) -> std::result::Result<Url, FetchError> {
        let slug = item.slug();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Other(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push(&slug)
            .push(&format!("{slug}.{}", self.extension));
        Ok(url)
    }

    /// `{id}.{ext}` with a lowercase id
    pub fn file_name_for(&self, item: &WorkItem) -> String {
        format!("{}.{}", item.slug(), self.extension)
    }
}

/// Fetch-and-save for one item at a time
///
/// Cheap to share: the limiters hold it behind an `Arc` and call
/// [`process`](Self::process) from threads or tasks.
pub struct ItemFetcher {
    layout: TargetLayout,
    source: Arc<dyn FetchSource>,
    store: Arc<dyn ArtifactStore>,
}

impl ItemFetcher {
    /// Create a fetcher from explicit collaborators
    pub fn new(
        layout: TargetLayout,
        source: Arc<dyn FetchSource>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            layout,
            source,
            store,
        }
    }

    /// HTTP source and directory store built from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let layout = TargetLayout::new(config.base_url()?, &config.source.file_extension);
        let source = HttpSource::new(config.source.request_timeout)?;
        let store = DirStore::new(&config.output.dest_dir);
        Ok(Self::new(layout, Arc::new(source), Arc::new(store)))
    }

    /// The target layout
    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    /// Fetch, save and classify one item. Never fails.
    ///
    /// A save failure after a successful fetch is reported as an error
    /// outcome, so a `Success` always means the artifact is on disk.
    pub async fn process(&self, item: &WorkItem) -> Outcome {
        let url = match self.layout.url_for(item) {
            Ok(url) => url,
            Err(e) => return Outcome::error(ItemError::new(item.clone(), e)),
        };

        let bytes = match self.source.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(FetchError::NotFound) => {
                tracing::debug!(item = %item, url = %url, "Item not found");
                return Outcome::not_found(item.clone());
            }
            Err(e) => {
                tracing::debug!(item = %item, url = %url, error = %e, "Fetch failed");
                return Outcome::error(ItemError::new(item.clone(), e));
            }
        };

        let name = self.layout.file_name_for(item);
        if let Err(source) = self.store.save(&name, &bytes).await {
            tracing::warn!(item = %item, file = %name, error = %source, "Failed to save artifact");
            return Outcome::error(ItemError::new(
                item.clone(),
                ItemFailure::Save { name, source },
            ));
        }

        tracing::debug!(item = %item, bytes = bytes.len(), "Item saved");
        Outcome::success(item.clone())
    }
}

impl std::fmt::Debug for ItemFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemFetcher")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
