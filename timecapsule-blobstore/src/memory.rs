//! In-process blob store.

use crate::{
    BlobEntry, BlobStore, BlobStoreError, BlobStoreResult, PageOptions, PutReceipt, content_hash,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    blobs: HashMap<String, (BlobEntry, Vec<u8>)>,
    /// Hashes in insertion order.
    order: Vec<String>,
    /// Name -> hash of the first blob stored under that name.
    names: HashMap<String, String>,
}

/// Blob store held entirely in memory. Cheap to construct; contents are lost
/// on drop.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<Inner>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt> {
        let hash = content_hash(data);
        let mut inner = self.inner.write().await;
        if !inner.blobs.contains_key(&hash) {
            let entry = BlobEntry {
                hash: hash.clone(),
                name: name.to_string(),
                size: data.len() as u64,
                timestamp: Utc::now(),
            };
            inner.blobs.insert(hash.clone(), (entry, data.to_vec()));
            inner.order.push(hash.clone());
            inner
                .names
                .entry(name.to_string())
                .or_insert_with(|| hash.clone());
            debug!(%hash, name, size = data.len(), "stored blob");
        }
        Ok(PutReceipt { hash })
    }

    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>> {
        self.inner
            .read()
            .await
            .blobs
            .get(hash)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| BlobStoreError::NotFound(hash.to_string()))
    }

    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .filter_map(|hash| inner.blobs.get(hash).map(|(entry, _)| entry.clone()))
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> BlobStoreResult<Option<BlobEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .names
            .get(name)
            .and_then(|hash| inner.blobs.get(hash))
            .map(|(entry, _)| entry.clone()))
    }
}
