//! Adapter for transports that block the calling thread.

use std::sync::Arc;
use url::Url;

use super::FetchSource;
use crate::error::FetchError;

/// A transport whose fetch blocks until the payload arrives
pub trait BlockingFetch: Send + Sync + 'static {
    /// Fetch the payload at `url`, blocking the current thread
    fn fetch_blocking(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Runs a [`BlockingFetch`] on tokio's blocking thread pool so it never
/// stalls the async workers
pub struct BlockingSource<S> {
    inner: Arc<S>,
}

impl<S: BlockingFetch> BlockingSource<S> {
    /// Wrap a blocking transport
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait::async_trait]
impl<S: BlockingFetch> FetchSource for BlockingSource<S> {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let inner = Arc::clone(&self.inner);
        let url = url.clone();
        tokio::task::spawn_blocking(move || inner.fetch_blocking(&url))
            .await
            .map_err(|e| FetchError::Other(format!("blocking fetch did not complete: {e}")))?
    }
}
