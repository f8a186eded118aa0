//! Request routing classes.
//!
//! Classification is computed fresh for every intercepted request. Order:
//! bypass host match first, then navigation mode, then asset.

use perch_core::{Request, RequestMode};
use url::Url;

/// Routing class of an intercepted request. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Always network, never cached.
    Bypass,
    /// Top-level page load: network first, cached fallback.
    Navigation,
    /// Everything else: stale-while-revalidate.
    Asset,
}

/// Classifies requests against a fixed bypass list.
///
/// The list is captured at construction and does not change for the lifetime
/// of one activated version.
#[derive(Debug, Clone)]
pub struct Classifier {
    bypass_hosts: Vec<String>,
}

impl Classifier {
    pub fn new(bypass_hosts: &[String]) -> Self {
        Self { bypass_hosts: bypass_hosts.iter().map(|h| h.trim().to_ascii_lowercase()).collect() }
    }

    /// Whether the URL's hostname contains any bypass entry.
    pub fn is_bypassed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.bypass_hosts.iter().any(|pattern| host.contains(pattern.as_str()))
    }

    pub fn classify(&self, url: &Url, mode: RequestMode) -> RequestClass {
        if self.is_bypassed(url) {
            RequestClass::Bypass
        } else if mode == RequestMode::Navigate {
            RequestClass::Navigation
        } else {
            RequestClass::Asset
        }
    }

    /// Classify a full request. Non-GET requests are never cacheable under a
    /// URL-only key, so they always go straight to the network.
    pub fn classify_request(&self, request: &Request) -> RequestClass {
        if !request.is_get() {
            return RequestClass::Bypass;
        }
        self.classify(&request.url, request.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&["generativelanguage.googleapis.com".to_string(), "openai".to_string()])
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_bypass_exact_host() {
        let c = classifier();
        let u = url("https://generativelanguage.googleapis.com/v1beta/models:generate");
        assert_eq!(c.classify(&u, RequestMode::Cors), RequestClass::Bypass);
    }

    #[test]
    fn test_bypass_substring_host() {
        let c = classifier();
        assert_eq!(c.classify(&url("https://api.openai.com/v1/chat"), RequestMode::Cors), RequestClass::Bypass);
    }

    #[test]
    fn test_bypass_wins_over_navigation() {
        let c = classifier();
        assert_eq!(c.classify(&url("https://platform.openai.com/"), RequestMode::Navigate), RequestClass::Bypass);
    }

    #[test]
    fn test_bypass_matches_host_not_path() {
        let c = classifier();
        let u = url("https://birds.test/articles/openai-and-birds");
        assert_eq!(c.classify(&u, RequestMode::SameOrigin), RequestClass::Asset);
    }

    #[test]
    fn test_bypass_case_insensitive_pattern() {
        let c = Classifier::new(&[" API.eBird.org ".to_string()]);
        assert!(c.is_bypassed(&url("https://api.ebird.org/v2/data")));
    }

    #[test]
    fn test_navigation() {
        let c = classifier();
        assert_eq!(c.classify(&url("https://birds.test/species/robin"), RequestMode::Navigate), RequestClass::Navigation);
    }

    #[test]
    fn test_asset_fallback() {
        let c = classifier();
        for mode in [RequestMode::SameOrigin, RequestMode::NoCors, RequestMode::Cors] {
            assert_eq!(c.classify(&url("https://birds.test/assets/app.js"), mode), RequestClass::Asset);
        }
    }

    #[test]
    fn test_empty_bypass_list() {
        let c = Classifier::new(&[]);
        assert_eq!(c.classify(&url("https://api.openai.com/v1"), RequestMode::Cors), RequestClass::Asset);
    }

    #[test]
    fn test_non_get_is_bypass() {
        let c = classifier();
        let req = Request::get(url("https://birds.test/sightings")).with_method("POST");
        assert_eq!(c.classify_request(&req), RequestClass::Bypass);
    }

    #[test]
    fn test_classify_request_get_navigation() {
        let c = classifier();
        let req = Request::navigate(url("https://birds.test/"));
        assert_eq!(c.classify_request(&req), RequestClass::Navigation);
    }
}
