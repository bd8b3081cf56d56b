//! Content-addressed blob storage.
//!
//! A blob is addressed by the hex SHA-256 of its bytes and carries a
//! human-readable name. Storing the same bytes twice is a no-op that returns
//! the same hash; the first name wins.
//!
//! Two backends ship with the crate:
//! - [`MemoryBlobStore`] for tests and ephemeral deployments
//! - [`DuckDbBlobStore`] backed by a DuckDB file (or in-memory database)

mod duckdb_store;
mod error;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub use duckdb_store::{DuckDbBlobStore, DuckDbConfig};
pub use error::{BlobStoreError, BlobStoreResult};
pub use memory::MemoryBlobStore;

/// Returned by [`BlobStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutReceipt {
    /// Hex SHA-256 of the stored bytes.
    pub hash: String,
}

/// Listing entry. Never carries the blob's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobEntry {
    pub hash: String,
    pub name: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

/// Pagination for [`BlobStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub limit: usize,
    pub offset: usize,
}

impl PageOptions {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// The page after this one.
    pub fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset + self.limit,
        }
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Content-addressed storage used by the capsule manager.
///
/// Listings are ordered oldest first, so paging is stable while blobs are
/// appended.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under its content hash.
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt>;

    /// Fetches a blob by hash. Unknown hashes are [`BlobStoreError::NotFound`].
    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>>;

    /// Lists one page of entries.
    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>>;

    /// Exact-name lookup, for stores that index names. Returns the oldest
    /// match. Default: `None` (callers fall back to scanning [`Self::list`]).
    async fn find_by_name(&self, _name: &str) -> BlobStoreResult<Option<BlobEntry>> {
        Ok(None)
    }
}

/// Hex SHA-256 of `data`: the address a blob is stored under.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
