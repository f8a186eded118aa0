//! Lifecycle event handlers for one worker version.
//!
//! Each handler is a self-contained unit of work: it consults the generation
//! manager, the classifier and the strategy engine, and reports back either
//! a result or, for install/activate, a signal on the host channel.

use std::sync::Arc;

use perch_client::{Fetcher, resolve_path};
use perch_core::{CacheStorage, Error, Request, WorkerConfig};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::classify::Classifier;
use crate::control::ControlMessage;
use crate::generations::{GenerationManager, GenerationNames, StoreSurvey};
use crate::lifecycle::{HostSignal, Registration};
use crate::strategy::{Resolved, StrategyEngine};

/// The interception layer for one configured version.
pub struct ServiceWorker {
    classifier: Classifier,
    generations: GenerationManager,
    strategies: StrategyEngine,
    control_token: String,
    signals: UnboundedSender<HostSignal>,
}

impl ServiceWorker {
    /// Build the worker and the channel it uses to signal its host.
    pub fn new(
        config: &WorkerConfig, store: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, UnboundedReceiver<HostSignal>), Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let root_url = resolve_path(&origin, &config.root_document)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.root_document)))?;

        let generations = GenerationManager::new(config, Arc::clone(&store), Arc::clone(&fetcher))?;
        let strategies =
            StrategyEngine::new(store, fetcher, generations.names().clone(), root_url, config.timeout());
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Self {
            classifier: Classifier::new(&config.bypass_hosts),
            generations,
            strategies,
            control_token: config.control_token.clone(),
            signals: tx,
        };
        Ok((worker, rx))
    }

    pub fn names(&self) -> &GenerationNames {
        self.generations.names()
    }

    /// Work out the registration from what earlier runs left in the store.
    ///
    /// Generations of this version and nothing older means this version was
    /// activated before, so it resumes control at once. Otherwise it starts
    /// from scratch, waiting if an older version's generations remain. An
    /// unreadable store counts as empty.
    pub async fn restore(&self) -> Registration {
        let survey = self.generations.survey().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not list generations");
            StoreSurvey::default()
        });

        if survey.already_active() {
            tracing::info!(generation = %self.names().default, "resuming activated version");
            Registration::resumed()
        } else {
            if survey.stale {
                tracing::info!("previous version still cached, new version will wait unless told to skip");
            }
            Registration::new(survey.stale)
        }
    }

    /// Pre-populate the static generation, then ask to skip waiting.
    ///
    /// A failed batch is returned to the caller but the signal is sent either
    /// way: the version still becomes eligible for activation.
    pub async fn on_install(&self) -> Result<usize, Error> {
        let result = self.generations.install().await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "shell pre-population failed");
        }
        self.signal(HostSignal::SkipWaiting);
        result
    }

    /// Remove stale generations, then ask to claim open clients.
    ///
    /// Store failures are logged and the claim still goes out.
    pub async fn on_activate(&self) -> Vec<String> {
        let deleted = self.generations.activate().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "stale generation cleanup failed");
            Vec::new()
        });
        self.signal(HostSignal::ClaimClients);
        deleted
    }

    /// Classify an intercepted request and run its strategy.
    pub async fn on_fetch(&self, request: &Request) -> Result<Resolved, Error> {
        let class = self.classifier.classify_request(request);
        tracing::debug!(url = %request.url, ?class, "intercepted request");
        self.strategies.handle(class, request).await
    }

    /// Straight to the network, for requests this version does not control.
    pub async fn passthrough(&self, request: &Request) -> Result<Resolved, Error> {
        self.strategies.network_only(request).await
    }

    /// React to a posted message. Returns what was recognized, if anything.
    pub fn on_message(&self, data: &Value) -> Option<ControlMessage> {
        let message = ControlMessage::parse(data, &self.control_token)?;
        match message {
            ControlMessage::SkipWaiting => self.signal(HostSignal::SkipWaiting),
        }
        Some(message)
    }

    fn signal(&self, signal: HostSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!(?signal, "host no longer listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::WorkerState;
    use crate::strategy::ResponseSource;
    use crate::testing::{BrokenStore, CountingStore, StubFetcher};
    use perch_core::{CacheDb, RequestMode};
    use serde_json::json;

    fn config() -> WorkerConfig {
        WorkerConfig {
            origin: "https://birds.test".into(),
            shell_assets: vec!["/".into(), "/manifest.json".into()],
            bypass_hosts: vec!["generativelanguage.googleapis.com".into()],
            ..Default::default()
        }
    }

    fn online() -> StubFetcher {
        StubFetcher::new()
            .respond("https://birds.test/", 200, "<html>root</html>")
            .respond("https://birds.test/manifest.json", 200, "{}")
    }

    fn drain(rx: &mut UnboundedReceiver<HostSignal>) -> Vec<HostSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test]
    async fn test_install_signals_skip_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, mut rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();

        assert_eq!(worker.on_install().await.unwrap(), 2);
        assert_eq!(drain(&mut rx), vec![HostSignal::SkipWaiting]);
    }

    #[tokio::test]
    async fn test_failed_install_still_signals() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, mut rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(StubFetcher::new())).unwrap();

        assert!(worker.on_install().await.is_err());
        assert_eq!(drain(&mut rx), vec![HostSignal::SkipWaiting]);
    }

    #[tokio::test]
    async fn test_activate_with_broken_store_still_claims() {
        let (worker, mut rx) = ServiceWorker::new(&config(), Arc::new(BrokenStore), Arc::new(online())).unwrap();

        assert!(worker.on_activate().await.is_empty());
        assert_eq!(drain(&mut rx), vec![HostSignal::ClaimClients]);
    }

    #[tokio::test]
    async fn test_activate_reports_deleted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("perch-v0").await.unwrap();
        let (worker, _rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();

        assert_eq!(worker.restore().await.state(), WorkerState::Parsed);
        assert_eq!(worker.on_activate().await, vec!["perch-v0".to_string()]);
    }

    #[tokio::test]
    async fn test_restore_after_activation_resumes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, _rx) = ServiceWorker::new(&config(), Arc::new(db.clone()), Arc::new(online())).unwrap();
        db.open("perch-v0").await.unwrap();
        worker.on_install().await.unwrap();
        assert!(!worker.restore().await.controls_clients());

        assert_eq!(worker.on_activate().await, vec!["perch-v0".to_string()]);
        let (restarted, _rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(StubFetcher::new())).unwrap();
        let registration = restarted.restore().await;
        assert_eq!(registration.state(), WorkerState::Activated);
        assert!(registration.controls_clients());
    }

    #[tokio::test]
    async fn test_restore_with_stale_generation_waits() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("perch-v0").await.unwrap();
        db.open("perch-static-v1").await.unwrap();
        let (worker, _rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();

        let mut registration = worker.restore().await;
        assert_eq!(registration.state(), WorkerState::Parsed);
        registration.begin_install().unwrap();
        registration.finish_install().unwrap();
        assert!(!registration.ready_to_activate());
    }

    #[tokio::test]
    async fn test_restore_with_broken_store_starts_fresh() {
        let (worker, _rx) = ServiceWorker::new(&config(), Arc::new(BrokenStore), Arc::new(online())).unwrap();
        assert_eq!(worker.restore().await.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_fetch_bypass_host_skips_store() {
        let store = Arc::new(CountingStore::in_memory().await);
        let url = "https://generativelanguage.googleapis.com/v1beta/models";
        let fetcher = StubFetcher::new().respond(url, 200, "{}");
        let (worker, _rx) = ServiceWorker::new(&config(), store.clone(), Arc::new(fetcher)).unwrap();

        let request = Request { mode: RequestMode::Cors, ..Request::get(Url::parse(url).unwrap()) };
        let resolved = worker.on_fetch(&request).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Network);
        assert_eq!((store.reads(), store.writes()), (0, 0));
    }

    #[tokio::test]
    async fn test_fetch_post_is_never_cached() {
        let store = Arc::new(CountingStore::in_memory().await);
        let url = "https://birds.test/sightings";
        let fetcher = StubFetcher::new().respond(url, 201, "created");
        let (worker, _rx) = ServiceWorker::new(&config(), store.clone(), Arc::new(fetcher)).unwrap();

        let request = Request::get(Url::parse(url).unwrap()).with_method("POST");
        let resolved = worker.on_fetch(&request).await.unwrap();

        assert_eq!(resolved.response.status, 201);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_fetch_navigation_uses_root_fallback() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, _rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();
        worker.on_install().await.unwrap();

        let request = Request::navigate(Url::parse("https://birds.test/species/wren").unwrap());
        let resolved = worker.on_fetch(&request).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::RootFallback);
        assert_eq!(resolved.response.body, "<html>root</html>");
    }

    #[tokio::test]
    async fn test_message_token_signals() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, mut rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();

        assert_eq!(worker.on_message(&json!({"type": "SKIP_WAITING"})), Some(ControlMessage::SkipWaiting));
        assert_eq!(worker.on_message(&json!("hello")), None);
        assert_eq!(drain(&mut rx), vec![HostSignal::SkipWaiting]);
    }

    #[tokio::test]
    async fn test_signal_without_listener_is_harmless() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, rx) = ServiceWorker::new(&config(), Arc::new(db), Arc::new(online())).unwrap();
        drop(rx);

        assert!(worker.on_message(&json!("SKIP_WAITING")).is_some());
    }
}
