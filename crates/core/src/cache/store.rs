//! The cache store abstraction and its SQLite implementation.
//!
//! A store holds named generations; each generation maps request URLs to
//! response snapshots. Every operation is async and may fail with
//! [`Error::StoreUnavailable`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::entry_key;
use super::snapshot::ResponseSnapshot;
use crate::Error;

/// Named, persistent, asynchronous key-value store of response snapshots.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the generation if it does not exist yet.
    async fn open(&self, generation: &str) -> Result<(), Error>;

    /// Look up the snapshot stored for `url` in one generation.
    async fn get(&self, generation: &str, url: &str) -> Result<Option<ResponseSnapshot>, Error>;

    /// Store a snapshot, creating the generation on first write.
    ///
    /// An existing entry is only replaced when the new snapshot was not fetched
    /// earlier than the stored one.
    async fn put(&self, generation: &str, snapshot: &ResponseSnapshot) -> Result<(), Error>;

    /// Store a batch of snapshots atomically: either all land or none do.
    async fn put_all(&self, generation: &str, snapshots: &[ResponseSnapshot]) -> Result<(), Error>;

    /// URLs stored in one generation, sorted.
    async fn keys(&self, generation: &str) -> Result<Vec<String>, Error>;

    /// Names of every generation present in the store, oldest first.
    async fn names(&self) -> Result<Vec<String>, Error>;

    /// Delete a generation and all of its entries. Returns false if it did not exist.
    async fn delete(&self, generation: &str) -> Result<bool, Error>;
}

fn upsert(conn: &rusqlite::Connection, generation: &str, snapshot: &ResponseSnapshot, now: &str) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&snapshot.headers)
        .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;

    conn.execute(
        "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
        params![generation, now],
    )?;
    conn.execute(
        "INSERT INTO entries (generation, key, url, status, headers_json, body, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(generation, key) DO UPDATE SET
             url = excluded.url,
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             fetched_at = excluded.fetched_at
         WHERE excluded.fetched_at >= entries.fetched_at",
        params![
            generation,
            entry_key(&snapshot.url),
            &snapshot.url,
            snapshot.status as i64,
            headers_json,
            snapshot.body.as_ref(),
            snapshot.fetched_at.timestamp_micros(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        let generation = generation.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![generation, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, generation: &str, url: &str) -> Result<Option<ResponseSnapshot>, Error> {
        let generation = generation.to_string();
        let key = entry_key(url);
        self.conn
            .call(move |conn| -> Result<Option<ResponseSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, headers_json, body, fetched_at
                     FROM entries WHERE generation = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![generation, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                });

                let (url, status, headers_json, body, fetched_at) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
                    .map_err(|e| Error::InvalidInput(format!("corrupt headers for {url}: {e}")))?;
                let fetched_at = DateTime::<Utc>::from_timestamp_micros(fetched_at).unwrap_or_default();

                Ok(Some(ResponseSnapshot { url, status: status as u16, headers, body: body.into(), fetched_at }))
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, generation: &str, snapshot: &ResponseSnapshot) -> Result<(), Error> {
        let generation = generation.to_string();
        let snapshot = snapshot.clone();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                upsert(&tx, &generation, &snapshot, &now)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, generation: &str, snapshots: &[ResponseSnapshot]) -> Result<(), Error> {
        let generation = generation.to_string();
        let snapshots = snapshots.to_vec();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for snapshot in &snapshots {
                    upsert(&tx, &generation, snapshot, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, generation: &str) -> Result<Vec<String>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE generation = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![generation], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at, name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE generation = ?1", params![generation])?;
                let deleted = tx.execute("DELETE FROM generations WHERE name = ?1", params![generation])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
