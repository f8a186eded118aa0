//! perch entry point.
//!
//! Reads lifecycle events from stdin, one JSON object per line, and writes one
//! reply per line to stdout. Fetch replies may come back out of order.
//! Logging goes to stderr to keep stdout clean for the protocol.

use std::sync::Arc;

use anyhow::{Context, Result};
use perch_client::{FetchConfig, HttpFetcher};
use perch_core::{CacheDb, WorkerConfig};
use perch_worker::{Host, HostReply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = WorkerConfig::load().context("loading configuration")?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "starting perch on stdio"
    );

    let store = CacheDb::open(&config.db_path).await.context("opening cache store")?;
    let fetcher = HttpFetcher::new(FetchConfig::from(&config))?;
    let mut host = Host::new(&config, Arc::new(store), Arc::new(fetcher)).await?;

    let (replies, mut outbox) = mpsc::unbounded_channel::<HostReply>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(reply) = outbox.recv().await {
            let mut encoded = serde_json::to_string(&reply)?;
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        host.submit_line(&line, &replies).await;
    }

    host.shutdown().await;
    drop(replies);
    writer.await.context("reply writer panicked")??;
    Ok(())
}
