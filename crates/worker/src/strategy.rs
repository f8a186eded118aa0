//! Fetch strategies, one per request class.
//!
//! | Class      | Strategy                              |
//! |------------|---------------------------------------|
//! | Bypass     | network only                          |
//! | Navigation | network first, cached/root fallback   |
//! | Asset      | stale-while-revalidate                |
//!
//! Network failures and cache misses are recovered here by falling through
//! to the next source. Only a navigation with nothing to fall back on, or an
//! asset with neither cache nor network, surfaces an error.

use std::sync::Arc;
use std::time::Duration;

use perch_client::Fetcher;
use perch_core::{CacheStorage, Error, Request, ResponseSnapshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::classify::RequestClass;
use crate::generations::GenerationNames;

/// Where the delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The root document, served for a navigation that missed.
    RootFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::RootFallback => "root-fallback",
        }
    }
}

type Revalidation = JoinHandle<Result<ResponseSnapshot, Error>>;

/// A response ready for the caller, plus any refresh still running.
#[derive(Debug)]
pub struct Resolved {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
    revalidation: Option<Revalidation>,
}

impl Resolved {
    fn new(response: ResponseSnapshot, source: ResponseSource) -> Self {
        Self { response, source, revalidation: None }
    }

    /// A background refresh is attached and not yet handed off or settled.
    pub fn is_revalidating(&self) -> bool {
        self.revalidation.is_some()
    }

    /// Hand the background refresh to the caller, who keeps it alive.
    pub fn take_revalidation(&mut self) -> Option<JoinHandle<Result<ResponseSnapshot, Error>>> {
        self.revalidation.take()
    }

    /// Wait for the background refresh, if any, to finish writing.
    pub async fn settle(&mut self) {
        let Some(handle) = self.revalidation.take() else {
            return;
        };
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::debug!(url = %self.response.url, error = %err, "revalidation failed"),
            Err(err) => tracing::warn!(url = %self.response.url, error = %err, "revalidation task aborted"),
        }
    }
}

/// Executes the strategy chosen for a request class.
#[derive(Clone)]
pub struct StrategyEngine {
    store: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    names: GenerationNames,
    root_url: Url,
    timeout: Duration,
}

impl StrategyEngine {
    pub fn new(
        store: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, names: GenerationNames, root_url: Url,
        timeout: Duration,
    ) -> Self {
        Self { store, fetcher, names, root_url, timeout }
    }

    pub async fn handle(&self, class: RequestClass, request: &Request) -> Result<Resolved, Error> {
        match class {
            RequestClass::Bypass => self.network_only(request).await,
            RequestClass::Navigation => self.network_first(request).await,
            RequestClass::Asset => self.stale_while_revalidate(request).await,
        }
    }

    /// Network response or failure verbatim. Never touches the store.
    pub async fn network_only(&self, request: &Request) -> Result<Resolved, Error> {
        let response = fetch_bounded(self.fetcher.as_ref(), request, self.timeout).await?;
        Ok(Resolved::new(response, ResponseSource::Network))
    }

    /// Network first; on failure the stored entry, then the root document.
    pub async fn network_first(&self, request: &Request) -> Result<Resolved, Error> {
        let url = request.url.as_str();

        match fetch_bounded(self.fetcher.as_ref(), request, self.timeout).await {
            Ok(response) => {
                if response.is_ok() {
                    store_quietly(self.store.as_ref(), &self.names.default, &response).await;
                }
                Ok(Resolved::new(response, ResponseSource::Network))
            }
            Err(err) => {
                tracing::debug!(url, error = %err, "navigation offline, trying cache");

                if let Some(hit) = read_quietly(self.store.get(&self.names.default, url).await, url) {
                    return Ok(Resolved::new(hit, ResponseSource::Cache));
                }

                let root = self.root_url.as_str();
                if let Some(hit) = read_quietly(self.names.lookup(self.store.as_ref(), root).await, root) {
                    tracing::debug!(url, "serving root document fallback");
                    return Ok(Resolved::new(hit, ResponseSource::RootFallback));
                }

                tracing::warn!(url, "navigation failed with no cached fallback");
                Err(Error::NoFallbackAvailable(url.to_string()))
            }
        }
    }

    /// Serve the cached copy now if there is one; always refresh from the
    /// network in the background.
    pub async fn stale_while_revalidate(&self, request: &Request) -> Result<Resolved, Error> {
        let url = request.url.as_str();
        let cached = read_quietly(self.names.lookup(self.store.as_ref(), url).await, url);

        let revalidation = tokio::spawn(revalidate(
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            self.names.default.clone(),
            request.clone(),
            self.timeout,
        ));

        if let Some(hit) = cached {
            tracing::debug!(url, "cache hit, revalidating in background");
            return Ok(Resolved { response: hit, source: ResponseSource::Cache, revalidation: Some(revalidation) });
        }

        tracing::debug!(url, "cache miss, waiting for network");
        match revalidation.await {
            Ok(Ok(response)) => Ok(Resolved::new(response, ResponseSource::Network)),
            Ok(Err(err)) => Err(err),
            Err(join) => Err(Error::NetworkUnavailable(format!("{url}: fetch task aborted: {join}"))),
        }
    }
}

/// Fetch with the configured deadline; elapsing counts as a network failure.
async fn fetch_bounded(fetcher: &dyn Fetcher, request: &Request, timeout: Duration) -> Result<ResponseSnapshot, Error> {
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::NetworkUnavailable(format!("{}: timed out after {}ms", request.url, timeout.as_millis()))),
    }
}

async fn revalidate(
    store: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, generation: String, request: Request, timeout: Duration,
) -> Result<ResponseSnapshot, Error> {
    let response = fetch_bounded(fetcher.as_ref(), &request, timeout).await?;
    if response.is_ok() {
        store_quietly(store.as_ref(), &generation, &response).await;
    } else {
        tracing::debug!(url = %request.url, status = response.status, "not caching non-OK response");
    }
    Ok(response)
}

async fn store_quietly(store: &dyn CacheStorage, generation: &str, response: &ResponseSnapshot) {
    if let Err(err) = store.put(generation, response).await {
        tracing::warn!(url = %response.url, generation, error = %err, "failed to cache response");
    }
}

/// A store failure on the read path is a miss.
fn read_quietly(result: Result<Option<ResponseSnapshot>, Error>, url: &str) -> Option<ResponseSnapshot> {
    result.unwrap_or_else(|err| {
        tracing::warn!(url, error = %err, "cache read failed");
        None
    })
}
