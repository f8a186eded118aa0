//! Network fetch seam used by the interception layer.
//!
//! ### Contract
//! - A fetch resolves with a [`ResponseSnapshot`] for *any* HTTP status; a 404
//!   or 500 is still a response. Whether it may be cached is the caller's call.
//! - Only transport failures (DNS, refused connection, TLS, timeout, aborted
//!   body) are errors, reported as `Error::NetworkUnavailable`.
//! - Bodies are read fully, bounded by `max_bytes`.
//!
//! ### URL Canonicalization
//! - Trim whitespace, require http(s), lowercase host, remove fragments
//! - Preserve query string

pub mod url;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, resolve_path};

use perch_core::{Error, Request, ResponseSnapshot};

/// Anything that can put a request on the wire.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue the request and read the complete response.
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, Error>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "perch/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "perch/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(10_000),
            max_redirects: 5,
        }
    }
}

impl From<&perch_core::WorkerConfig> for FetchConfig {
    fn from(config: &perch_core::WorkerConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

fn network_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::NetworkUnavailable(format!("{url}: timed out"))
    } else {
        Error::NetworkUnavailable(format!("{url}: {err}"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, Error> {
        let start = Instant::now();
        let url = request.url.as_str();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method {:?}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| network_error(url, e))?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| *name != header::SET_COOKIE)
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes = response.bytes().await.map_err(|e| network_error(url, e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(ResponseSnapshot { url: url.to_string(), status: status.as_u16(), headers, body: bytes, fetched_at: Utc::now() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a loopback port.
    async fn serve_once(raw: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/")
    }

    fn request(url: &str) -> Request {
        Request::get(canonicalize(url).unwrap())
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "perch/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(10_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_worker_config() {
        let worker = perch_core::WorkerConfig { user_agent: "birdwatch/2".into(), timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&worker);
        assert_eq!(config.user_agent, "birdwatch/2");
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_fetch_ok_response() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 6\r\nConnection: close\r\n\r\n<html>",
        )
        .await;
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();

        let snapshot = fetcher.fetch(&request(&url)).await.unwrap();
        assert_eq!(snapshot.status, 200);
        assert_eq!(snapshot.body, "<html>");
        assert_eq!(snapshot.content_type(), Some("text/html"));
        assert_eq!(snapshot.url, url);
    }

    #[tokio::test]
    async fn test_fetch_non_ok_is_a_response() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\nConnection: close\r\n\r\nnah").await;
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();

        let snapshot = fetcher.fetch(&request(&url)).await.unwrap();
        assert_eq!(snapshot.status, 404);
        assert!(!snapshot.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789").await;
        let fetcher = HttpFetcher::new(FetchConfig { max_bytes: 4, ..Default::default() }).unwrap();

        let result = fetcher.fetch(&request(&url)).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let result = fetcher.fetch(&request(&format!("http://{addr}/"))).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_method() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let req = Request { method: "BAD METHOD".into(), ..request("http://127.0.0.1:9/") };
        let result = fetcher.fetch(&req).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
