//! Test doubles for the store and the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use perch_client::Fetcher;
use perch_core::error::StoreError;
use perch_core::{CacheDb, CacheStorage, Error, Request, ResponseSnapshot};
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond(u16, String),
    Offline,
    /// Never resolves.
    Hang,
    /// The fetch task crashes.
    Panic,
}

/// Scripted network: fixed replies per URL, everything else is offline.
#[derive(Default)]
pub(crate) struct StubFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.set(url, Reply::Respond(status, body.to_string()));
        self
    }

    /// Hold every fetch until the returned semaphore gets a permit.
    pub(crate) fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub(crate) fn set(&self, url: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let reply = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match reply {
            Some(Reply::Respond(status, body)) => Ok(ResponseSnapshot::new(request.url.as_str(), status, body)),
            Some(Reply::Offline) | None => Err(Error::NetworkUnavailable(format!("{}: offline", request.url))),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Panic) => panic!("fetch of {} crashed", request.url),
        }
    }
}

/// Store decorator that counts reads and writes.
pub(crate) struct CountingStore {
    inner: CacheDb,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub(crate) async fn in_memory() -> Self {
        Self { inner: CacheDb::open_in_memory().await.unwrap(), reads: AtomicUsize::new(0), writes: AtomicUsize::new(0) }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStorage for CountingStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open(generation).await
    }

    async fn get(&self, generation: &str, url: &str) -> Result<Option<ResponseSnapshot>, Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(generation, url).await
    }

    async fn put(&self, generation: &str, snapshot: &ResponseSnapshot) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(generation, snapshot).await
    }

    async fn put_all(&self, generation: &str, snapshots: &[ResponseSnapshot]) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_all(generation, snapshots).await
    }

    async fn keys(&self, generation: &str) -> Result<Vec<String>, Error> {
        self.inner.keys(generation).await
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.inner.names().await
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        self.inner.delete(generation).await
    }
}

/// Store whose every operation fails, as when the database file is gone.
pub(crate) struct BrokenStore;

#[async_trait]
impl CacheStorage for BrokenStore {
    async fn open(&self, _generation: &str) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn get(&self, _generation: &str, _url: &str) -> Result<Option<ResponseSnapshot>, Error> {
        Err(unavailable())
    }

    async fn put(&self, _generation: &str, _snapshot: &ResponseSnapshot) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn put_all(&self, _generation: &str, _snapshots: &[ResponseSnapshot]) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn keys(&self, _generation: &str) -> Result<Vec<String>, Error> {
        Err(unavailable())
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Err(unavailable())
    }

    async fn delete(&self, _generation: &str) -> Result<bool, Error> {
        Err(unavailable())
    }
}

fn unavailable() -> Error {
    Error::StoreUnavailable(StoreError::ConnectionClosed)
}
