//! Shared helpers for capsule integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use timecapsule_blobstore::{
    BlobEntry, BlobStore, BlobStoreResult, MemoryBlobStore, PageOptions, PutReceipt,
};
use timecapsule_core::{CapsuleManager, CapsuleRecord, CreateCapsuleRequest, ManualClock};

pub const CREATOR: &str = "0xcreator";
pub const RECIPIENT: &str = "0xrecipient";

/// Fixed start time so assertions on timestamps are exact.
pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub struct Harness {
    pub manager: CapsuleManager,
    pub store: Arc<dyn BlobStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn over(store: Arc<dyn BlobStore>) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let manager = CapsuleManager::new(Arc::clone(&store)).with_clock(clock.clone());
        Self {
            manager,
            store,
            clock,
        }
    }

    pub fn new() -> Self {
        Self::over(Arc::new(MemoryBlobStore::new()))
    }

    /// A second manager sharing this store and clock, with an empty index.
    pub fn restarted(&self) -> CapsuleManager {
        CapsuleManager::new(Arc::clone(&self.store)).with_clock(self.clock.clone())
    }

    pub fn message_in(&self, message: &str, after: Duration) -> CreateCapsuleRequest {
        CreateCapsuleRequest::message(message, epoch() + after, CREATOR, RECIPIENT)
    }
}

/// Delegates to a memory store but hides `find_by_name`, forcing recovery
/// onto the listing scan.
#[derive(Default)]
pub struct ListingOnlyStore {
    inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for ListingOnlyStore {
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt> {
        self.inner.put(data, name).await
    }

    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>> {
        self.inner.get(hash).await
    }

    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>> {
        self.inner.list(page).await
    }
}

/// Serves capsule records with one ciphertext bit flipped once armed.
#[derive(Default)]
pub struct TamperingStore {
    inner: MemoryBlobStore,
    armed: AtomicBool,
}

impl TamperingStore {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for TamperingStore {
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt> {
        self.inner.put(data, name).await
    }

    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>> {
        let bytes = self.inner.get(hash).await?;
        if !self.armed.load(Ordering::SeqCst) {
            return Ok(bytes);
        }
        let mut record: CapsuleRecord = serde_json::from_slice(&bytes).unwrap();
        record.encrypted_content.ciphertext[0] ^= 0x01;
        Ok(serde_json::to_vec(&record).unwrap())
    }

    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>> {
        self.inner.list(page).await
    }

    async fn find_by_name(&self, name: &str) -> BlobStoreResult<Option<BlobEntry>> {
        self.inner.find_by_name(name).await
    }
}

/// Holds the first `get` after [`GatedStore::arm`] until [`GatedStore::release`].
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryBlobStore,
    armed: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl GatedStore {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a `get` is parked at the gate.
    pub async fn parked(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl BlobStore for GatedStore {
    async fn put(&self, data: &[u8], name: &str) -> BlobStoreResult<PutReceipt> {
        self.inner.put(data, name).await
    }

    async fn get(&self, hash: &str) -> BlobStoreResult<Vec<u8>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.inner.get(hash).await
    }

    async fn list(&self, page: PageOptions) -> BlobStoreResult<Vec<BlobEntry>> {
        self.inner.list(page).await
    }

    async fn find_by_name(&self, name: &str) -> BlobStoreResult<Option<BlobEntry>> {
        self.inner.find_by_name(name).await
    }
}
