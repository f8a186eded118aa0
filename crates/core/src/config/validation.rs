//! Configuration validation rules.
//!
//! This module provides validation logic for `WorkerConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::WorkerConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl WorkerConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `version`, `cache_prefix`, `control_token` or `user_agent` is empty
    /// - a shell asset or the root document is not an absolute path
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - a bypass host entry is blank
    ///
    /// Returns `ConfigError::Missing` if the shell assets lack the root
    /// document or a web manifest.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(_) => return Err(invalid("origin", "must be an http(s) URL with a host")),
            Err(e) => return Err(invalid("origin", &e.to_string())),
        }

        for (field, value) in [
            ("version", &self.version),
            ("cache_prefix", &self.cache_prefix),
            ("control_token", &self.control_token),
            ("user_agent", &self.user_agent),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if !self.root_document.starts_with('/') {
            return Err(invalid("root_document", "must be an absolute path"));
        }
        if let Some(bad) = self.shell_assets.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("shell_assets", &format!("{bad:?} is not an absolute path")));
        }
        if !self.shell_assets.contains(&self.root_document) {
            return Err(ConfigError::Missing {
                field: "shell_assets".into(),
                hint: format!("include the root document {:?}", self.root_document),
            });
        }
        if !self
            .shell_assets
            .iter()
            .any(|p| p.ends_with("manifest.json") || p.ends_with(".webmanifest"))
        {
            return Err(ConfigError::Missing {
                field: "shell_assets".into(),
                hint: "include the web app manifest".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.bypass_hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(invalid("bypass_hosts", "entries must not be blank"));
        }
        if self.bypass_hosts.is_empty() {
            tracing::warn!("bypass_hosts is empty; every cross-origin API call will be cached");
        }

        Ok(())
    }
}
