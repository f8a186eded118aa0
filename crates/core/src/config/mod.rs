//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PERCH_*)
//! 2. TOML config file (if PERCH_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is handed to the interception layer at construction; the
//! layer never reads configuration from anywhere else.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Interception layer configuration.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PERCH_*)
/// 2. TOML config file (if PERCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via PERCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the application shell is served from. Shell asset paths and the
    /// root document are resolved against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix shared by both generation names.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version token embedded in generation names.
    ///
    /// Bump it on every deployment: activation only evicts generations whose
    /// names differ from the current ones.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path of the document served when a navigation has nothing better.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Paths pre-populated into the static generation at install.
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,

    /// Hostname substrings whose requests always go to the network.
    #[serde(default = "default_bypass_hosts")]
    pub bypass_hosts: Vec<String>,

    /// Message value that asks an installed version to activate now.
    #[serde(default = "default_control_token")]
    pub control_token: String,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./perch-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_cache_prefix() -> String {
    "perch".into()
}

fn default_version() -> String {
    "v1".into()
}

fn default_root_document() -> String {
    "/".into()
}

fn default_shell_assets() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/icons/icon-192.png", "/icons/icon-512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_bypass_hosts() -> Vec<String> {
    ["generativelanguage.googleapis.com", "api.openai.com", "nominatim.openstreetmap.org"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_control_token() -> String {
    "SKIP_WAITING".into()
}

fn default_user_agent() -> String {
    "perch/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            root_document: default_root_document(),
            shell_assets: default_shell_assets(),
            bypass_hosts: default_bypass_hosts(),
            control_token: default_control_token(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl WorkerConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the lazily populated generation, e.g. `perch-v1`.
    pub fn default_generation(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Name of the install-time generation, e.g. `perch-static-v1`.
    pub fn static_generation(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PERCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PERCH_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
