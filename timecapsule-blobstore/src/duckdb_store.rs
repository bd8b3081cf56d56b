//! DuckDB-backed blob store.
//!
//! All queries run on tokio's blocking pool; the connection sits behind a
//! mutex so a single store can be shared across tasks.

use crate::{
    BlobEntry, BlobStore, BlobStoreError, BlobStoreResult, PageOptions, PutReceipt, content_hash,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Resource caps applied to file-backed databases. DuckDB otherwise claims
/// most of the machine's RAM per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuckDbConfig {
    pub memory_limit: String,
    pub threads: u32,
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            memory_limit: "128MB".to_string(),
            threads: 1,
        }
    }
}

pub struct DuckDbBlobStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbBlobStore {
    /// Opens (or creates) a store at `path` with default resource caps.
    pub fn open(path: &Path) -> BlobStoreResult<Self> {
        Self::open_with_config(path, &DuckDbConfig::default())
    }

    /// Opens (or creates) a store at `path`.
    ///
    /// If the database fails to open and a stale WAL file sits next to it,
    /// the WAL is removed and the open retried once.
    pub fn open_with_config(path: &Path, config: &DuckDbConfig) -> BlobStoreResult<Self> {
        let conn = match Connection::open(path) {
            Ok(c) => c,
            Err(first_err) => {
                let wal_path = path.with_extension(
                    path.extension()
                        .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                        .unwrap_or_else(|| "wal".to_string()),
                );
                if !wal_path.exists() || std::fs::remove_file(&wal_path).is_err() {
                    return Err(first_err.into());
                }
                warn!(wal = %wal_path.display(), "DuckDB open failed, removed stale WAL and retrying");
                Connection::open(path)?
            }
        };
        conn.execute_batch(&format!(
            "PRAGMA memory_limit='{}'; PRAGMA threads={};",
            config.memory_limit, config.threads
        ))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> BlobStoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> BlobStoreResult<Self> {
        conn.execute_batch(
            "CREATE SEQUENCE IF NOT EXISTS blobs_seq;
            CREATE TABLE IF NOT EXISTS blobs (
                seq BIGINT NOT NULL DEFAULT nextval('blobs_seq'),
                hash VARCHAR PRIMARY KEY,
                name VARCHAR NOT NULL,
                data BLOB NOT NULL,
                size BIGINT NOT NULL,
                created_at BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS blobs_name_idx ON blobs (name);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> BlobStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> BlobStoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| BlobStoreError::Storage(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| BlobStoreError::Storage(format!("blocking task failed: {e}")))?
    }
}

fn row_to_entry(row: &duckdb::Row<'_>) -> duckdb::Result<BlobEntry> {
    let size: i64 = row.get(2)?;
    let created_at: i64 = row.get(3)?;
    Ok(BlobEntry {
        hash: row.get(0)?,
        name: row.get(1)?,
        size: size.max(0) as u64,
        timestamp: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
    })
}

#[async_trait]
impl BlobStore for DuckDbBlobStore {
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt> {
        let hash = content_hash(data);
        let data = data.to_vec();
        let name = name.to_string();
        let key = hash.clone();

        let inserted = self
            .run(move |conn| {
                let now = Utc::now().timestamp_millis();
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO blobs (hash, name, data, size, created_at)
                     VALUES (?, ?, ?, ?, ?)",
                    params![key, name, data, data.len() as i64, now],
                )?)
            })
            .await?;
        if inserted > 0 {
            debug!(%hash, "stored blob");
        }
        Ok(PutReceipt { hash })
    }

    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>> {
        let hash = hash.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT data FROM blobs WHERE hash = ?",
                params![hash],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or(BlobStoreError::NotFound(hash))
        })
        .await
    }

    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT hash, name, size, created_at FROM blobs
                 ORDER BY seq ASC
                 LIMIT ? OFFSET ?",
            )?;
            let entries = stmt
                .query_map(
                    params![page.limit as i64, page.offset as i64],
                    row_to_entry,
                )?
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn find_by_name(&self, name: &str) -> BlobStoreResult<Option<BlobEntry>> {
        let name = name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT hash, name, size, created_at FROM blobs
                     WHERE name = ?
                     ORDER BY seq ASC
                     LIMIT 1",
                    params![name],
                    row_to_entry,
                )
                .optional()?)
        })
        .await
    }
}
