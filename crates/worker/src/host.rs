//! JSON-lines host protocol.
//!
//! The host feeds lifecycle events to the worker, one JSON object per line,
//! and writes back exactly one reply per event. It owns the registration
//! state, so it decides whether a fetch is intercepted or passed through, and
//! it keeps background work alive until shutdown.
//!
//! Install, activate, message and status run in arrival order. Fetches
//! submitted with [`Host::submit_line`] each run as their own task and may
//! reply out of order; the optional `id` pairs a reply with its request.
//!
//! ```text
//! -> {"event":"install"}
//! <- {"reply":"installed","assets":5}
//! -> {"event":"fetch","id":7,"url":"https://birds.test/","mode":"navigate"}
//! <- {"reply":"response","id":7,"status":200,"source":"network",...}
//! ```

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::join_all;
use perch_client::{Fetcher, canonicalize};
use perch_core::{CacheStorage, Error, Request, RequestMode, WorkerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::HostError;
use crate::lifecycle::{HostSignal, Registration};
use crate::strategy::Resolved;
use crate::worker::ServiceWorker;

/// One inbound event line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        #[serde(default)]
        id: Option<u64>,
        url: String,
        #[serde(default)]
        mode: RequestMode,
        #[serde(default = "default_method")]
        method: String,
    },
    Message {
        #[serde(default)]
        data: Value,
    },
    Status,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One outbound reply line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum HostReply {
    Installed {
        assets: usize,
        /// Why pre-population failed. The version is installed regardless.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Activated {
        deleted: Vec<String>,
    },
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        url: String,
        status: u16,
        source: String,
        headers: Vec<(String, String)>,
        body_base64: String,
    },
    Message {
        recognized: bool,
        /// The message promoted the installed version to active.
        activated: bool,
    },
    Status {
        state: String,
        ready_to_activate: bool,
        controls_clients: bool,
        default_generation: String,
        static_generation: String,
        pending_tasks: usize,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        code: String,
        message: String,
    },
}

impl HostReply {
    fn response(id: Option<u64>, resolved: &Resolved) -> Self {
        let response = &resolved.response;
        HostReply::Response {
            id,
            url: response.url.clone(),
            status: response.status,
            source: resolved.source.as_str().to_string(),
            headers: response.headers.clone(),
            body_base64: STANDARD.encode(&response.body),
        }
    }

    fn fetch_failed(id: Option<u64>, err: HostError) -> Self {
        match HostReply::from(err) {
            HostReply::Failed { code, message, .. } => HostReply::Failed { id, code, message },
            other => other,
        }
    }
}

async fn serve(worker: &ServiceWorker, request: &Request, intercept: bool) -> Result<Resolved, Error> {
    if intercept { worker.on_fetch(request).await } else { worker.passthrough(request).await }
}

pub struct Host {
    worker: Arc<ServiceWorker>,
    signals: UnboundedReceiver<HostSignal>,
    registration: Registration,
    /// Spawned fetches and background refreshes still running.
    tasks: Vec<JoinHandle<()>>,
}

impl Host {
    /// Build the worker and restore its registration from the store.
    pub async fn new(
        config: &WorkerConfig, store: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, Error> {
        let (worker, signals) = ServiceWorker::new(config, store, fetcher)?;
        let registration = worker.restore().await;
        Ok(Self { worker: Arc::new(worker), signals, registration, tasks: Vec::new() })
    }

    /// Decode one event line and handle it to completion.
    pub async fn handle_line(&mut self, line: &str) -> HostReply {
        match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => HostError::InvalidEvent(e.to_string()).into(),
        }
    }

    /// Decode one event line; its reply goes to `replies`.
    ///
    /// A fetch is spawned and replies when its strategy resolves, so a slow
    /// network does not hold up the lines behind it. Every other event is
    /// handled before this returns.
    pub async fn submit_line(&mut self, line: &str, replies: &UnboundedSender<HostReply>) {
        let reply = match serde_json::from_str::<HostEvent>(line) {
            Ok(HostEvent::Fetch { id, url, mode, method }) => match self.prepare_fetch(&url, mode, &method) {
                Ok((request, intercept)) => {
                    self.spawn_fetch(id, request, intercept, replies.clone());
                    return;
                }
                Err(err) => HostReply::fetch_failed(id, err),
            },
            Ok(event) => self.dispatch(event).await,
            Err(e) => HostError::InvalidEvent(e.to_string()).into(),
        };
        if replies.send(reply).is_err() {
            tracing::debug!("reply channel closed");
        }
    }

    pub async fn dispatch(&mut self, event: HostEvent) -> HostReply {
        let result = match event {
            HostEvent::Install => self.install().await,
            HostEvent::Activate => self.activate().await,
            HostEvent::Fetch { id, url, mode, method } => {
                return self
                    .fetch(id, &url, mode, &method)
                    .await
                    .unwrap_or_else(|err| HostReply::fetch_failed(id, err));
            }
            HostEvent::Message { data } => self.message(&data).await,
            HostEvent::Status => Ok(self.status()),
        };
        result.unwrap_or_else(HostReply::from)
    }

    /// Wait for every spawned fetch and background refresh. Returns how many
    /// were joined.
    pub async fn shutdown(mut self) -> usize {
        let pending = std::mem::take(&mut self.tasks);
        let count = pending.len();
        for outcome in join_all(pending).await {
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "host task aborted");
            }
        }
        tracing::info!(joined = count, "host shut down");
        count
    }

    async fn install(&mut self) -> Result<HostReply, HostError> {
        self.registration.begin_install()?;
        let outcome = self.worker.on_install().await;
        self.registration.finish_install()?;
        self.drain_signals();

        Ok(match outcome {
            Ok(assets) => HostReply::Installed { assets, error: None },
            Err(err) => HostReply::Installed { assets: 0, error: Some(err.to_string()) },
        })
    }

    async fn activate(&mut self) -> Result<HostReply, HostError> {
        self.drain_signals();
        let deleted = self.promote().await?;
        Ok(HostReply::Activated { deleted })
    }

    /// Installed to activated: sweep stale generations, then claim clients.
    async fn promote(&mut self) -> Result<Vec<String>, HostError> {
        self.registration.begin_activate()?;
        let deleted = self.worker.on_activate().await;
        self.registration.finish_activate()?;
        self.drain_signals();
        Ok(deleted)
    }

    fn prepare_fetch(&mut self, url: &str, mode: RequestMode, method: &str) -> Result<(Request, bool), HostError> {
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let request = Request { mode, ..Request::get(url).with_method(method) };

        self.drain_signals();
        self.tasks.retain(|task| !task.is_finished());
        Ok((request, self.registration.controls_clients()))
    }

    async fn fetch(
        &mut self, id: Option<u64>, url: &str, mode: RequestMode, method: &str,
    ) -> Result<HostReply, HostError> {
        let (request, intercept) = self.prepare_fetch(url, mode, method)?;
        let mut resolved = serve(&self.worker, &request, intercept).await?;
        let reply = HostReply::response(id, &resolved);

        if resolved.is_revalidating() {
            self.tasks.push(tokio::spawn(async move { resolved.settle().await }));
        }
        Ok(reply)
    }

    fn spawn_fetch(
        &mut self, id: Option<u64>, request: Request, intercept: bool, replies: UnboundedSender<HostReply>,
    ) {
        let worker = Arc::clone(&self.worker);
        self.tasks.push(tokio::spawn(async move {
            let send = |reply: HostReply| {
                if replies.send(reply).is_err() {
                    tracing::debug!(url = %request.url, "reply channel closed");
                }
            };
            match serve(&worker, &request, intercept).await {
                Ok(mut resolved) => {
                    send(HostReply::response(id, &resolved));
                    resolved.settle().await;
                }
                Err(err) => send(HostReply::fetch_failed(id, err.into())),
            }
        }));
    }

    /// A recognized control token promotes an installed version at once.
    async fn message(&mut self, data: &Value) -> Result<HostReply, HostError> {
        let recognized = self.worker.on_message(data).is_some();
        self.drain_signals();

        let activated = recognized && self.registration.ready_to_activate();
        if activated {
            let deleted = self.promote().await?;
            tracing::info!(deleted = deleted.len(), "activated on control message");
        }
        Ok(HostReply::Message { recognized, activated })
    }

    fn status(&mut self) -> HostReply {
        self.drain_signals();
        self.tasks.retain(|task| !task.is_finished());
        let names = self.worker.names();
        HostReply::Status {
            state: self.registration.state().as_str().to_string(),
            ready_to_activate: self.registration.ready_to_activate(),
            controls_clients: self.registration.controls_clients(),
            default_generation: names.default.clone(),
            static_generation: names.static_.clone(),
            pending_tasks: self.tasks.len(),
        }
    }

    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            self.registration.apply(signal);
        }
    }
}
