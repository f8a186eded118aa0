//! Cache generation lifecycle.
//!
//! Two generations are current at any time: the default one, filled lazily by
//! navigation and asset fetches, and the static one, filled with the shell
//! assets at install. Both names embed the version token, so a new version
//! has a new allow-list and activation sweeps the old names away.
//!
//! A deployment that forgets to bump the version keeps the same names and
//! never evicts anything.

use std::sync::Arc;

use futures::future::try_join_all;
use perch_client::{Fetcher, resolve_path};
use perch_core::{CacheStorage, Error, Request, ResponseSnapshot, WorkerConfig};
use url::Url;

/// The two current generation names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
    pub default: String,
    pub static_: String,
}

impl GenerationNames {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self { default: config.default_generation(), static_: config.static_generation() }
    }

    /// Every name allowed to survive activation.
    pub fn allow_list(&self) -> [&str; 2] {
        [self.default.as_str(), self.static_.as_str()]
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.allow_list().contains(&name)
    }

    /// Union lookup across the current generations.
    ///
    /// The default generation is consulted first: it holds the most recent
    /// network copy, while the static one holds the install-time copy.
    pub async fn lookup(&self, store: &dyn CacheStorage, url: &str) -> Result<Option<ResponseSnapshot>, Error> {
        for name in self.allow_list() {
            if let Some(hit) = store.get(name, url).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

/// Owns install-time pre-population and activation-time cleanup.
pub struct GenerationManager {
    store: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    names: GenerationNames,
    shell_assets: Vec<Url>,
}

impl GenerationManager {
    /// Resolve the shell asset paths against the origin.
    pub fn new(config: &WorkerConfig, store: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let shell_assets = config
            .shell_assets
            .iter()
            .map(|path| resolve_path(&origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { store, fetcher, names: GenerationNames::from_config(config), shell_assets })
    }

    pub fn names(&self) -> &GenerationNames {
        &self.names
    }

    pub fn shell_assets(&self) -> &[Url] {
        &self.shell_assets
    }

    /// Pre-populate the static generation with every shell asset.
    ///
    /// All-or-nothing: the assets are fetched concurrently and written in one
    /// batch only if every fetch produced an OK response. Returns the number of
    /// assets stored.
    pub async fn install(&self) -> Result<usize, Error> {
        self.store.open(&self.names.static_).await?;

        let fetches = self.shell_assets.iter().map(|url| {
            let fetcher = Arc::clone(&self.fetcher);
            let request = Request::get(url.clone());
            async move {
                let snapshot = fetcher.fetch(&request).await?;
                if !snapshot.is_ok() {
                    return Err(Error::HttpError(format!("{}: status {}", request.url, snapshot.status)));
                }
                Ok(snapshot)
            }
        });
        let snapshots = try_join_all(fetches).await?;

        self.store.put_all(&self.names.static_, &snapshots).await?;

        tracing::info!(generation = %self.names.static_, assets = snapshots.len(), "pre-populated shell assets");
        Ok(snapshots.len())
    }

    /// Delete every generation outside the allow-list. Returns what was deleted.
    ///
    /// Running it again with the same allow-list deletes nothing.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let stale: Vec<String> = self
            .store
            .names()
            .await?
            .into_iter()
            .filter(|name| !self.names.is_current(name))
            .collect();

        for name in &stale {
            self.store.delete(name).await?;
            tracing::info!(generation = %name, "deleted stale generation");
        }

        Ok(stale)
    }

    /// Classify the generations already in the store against the allow-list.
    pub async fn survey(&self) -> Result<StoreSurvey, Error> {
        let names = self.store.names().await?;
        Ok(StoreSurvey {
            current: names.iter().any(|name| self.names.is_current(name)),
            stale: names.iter().any(|name| !self.names.is_current(name)),
        })
    }
}

/// What a store holds relative to the current allow-list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSurvey {
    /// A generation of this version exists: it was installed here before.
    pub current: bool,
    /// A generation of another version exists: an older version ran here and
    /// has not been swept yet.
    pub stale: bool,
}

impl StoreSurvey {
    /// This version was activated in an earlier run.
    pub fn already_active(&self) -> bool {
        self.current && !self.stale
    }
}
