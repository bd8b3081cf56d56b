//! Rebuilding the local index from the blob store.
//!
//! Every capsule's durable record is self-describing, so a capsule whose
//! index entry was lost (process restart, fresh node) can be reconstructed
//! from the store alone. Only non-secret fields come back.

use crate::config::CapsuleConfig;
use crate::error::CapsuleResult;
use crate::repository::{CapsuleRepository, UnlockTransition};
use crate::store::bounded;
use crate::types::{Capsule, CapsuleRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use timecapsule_blobstore::{BlobEntry, BlobStore, PageOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RecoveryScanner {
    store: Arc<dyn BlobStore>,
    config: CapsuleConfig,
}

impl RecoveryScanner {
    pub fn new(store: Arc<dyn BlobStore>, config: CapsuleConfig) -> Self {
        Self { store, config }
    }

    /// Looks for the durable record of `id`.
    ///
    /// Tries the store's name index first, then scans listings for names
    /// containing the id. Unreadable candidates are skipped; a failed
    /// listing ends the scan. `None` means nothing matched.
    pub async fn recover(&self, id: &Uuid) -> Option<Capsule> {
        let name = self.config.record_name(id);
        let limit = self.config.store_timeout();

        match bounded("find_by_name", limit, self.store.find_by_name(&name)).await {
            Ok(Some(entry)) => {
                if let Some(capsule) = self.load(id, &entry).await {
                    info!(capsule_id = %id, hash = %entry.hash, "recovered capsule by name");
                    return Some(capsule);
                }
            }
            Ok(None) => debug!(capsule_id = %id, "no indexed record, scanning listings"),
            Err(e) => warn!(capsule_id = %id, error = %e, "name lookup failed, scanning listings"),
        }

        let needle = id.to_string();
        let mut page = PageOptions::new(self.config.recovery_page_size, 0);
        for _ in 0..self.config.recovery_max_pages {
            let entries = match bounded("list", limit, self.store.list(page)).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(capsule_id = %id, error = %e, "listing failed, ending recovery scan");
                    return None;
                }
            };
            debug!(capsule_id = %id, offset = page.offset, count = entries.len(), "scanning page");

            for entry in entries.iter().filter(|e| e.name.contains(&needle)) {
                if let Some(capsule) = self.load(id, entry).await {
                    info!(capsule_id = %id, hash = %entry.hash, "recovered capsule by scan");
                    return Some(capsule);
                }
            }
            if entries.len() < page.limit {
                break;
            }
            page = page.next();
        }

        info!(capsule_id = %id, "no durable record found");
        None
    }

    async fn load(&self, id: &Uuid, entry: &BlobEntry) -> Option<Capsule> {
        let bytes = match bounded("get", self.config.store_timeout(), self.store.get(&entry.hash))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(hash = %entry.hash, error = %e, "skipping unreadable candidate");
                return None;
            }
        };
        let record: CapsuleRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                debug!(hash = %entry.hash, error = %e, "candidate is not a capsule record");
                return None;
            }
        };
        if record.id != *id {
            debug!(hash = %entry.hash, found = %record.id, "capsule id mismatch");
            return None;
        }
        Some(record.into_capsule(entry.hash.clone()))
    }
}

/// A repository that falls back to [`RecoveryScanner`] on a miss and caches
/// what it recovers in the wrapped repository. The cache write never replaces
/// an entry that appeared while the scan ran.
pub struct RecoveringRepository {
    primary: Arc<dyn CapsuleRepository>,
    scanner: RecoveryScanner,
}

impl RecoveringRepository {
    pub fn new(primary: Arc<dyn CapsuleRepository>, scanner: RecoveryScanner) -> Self {
        Self { primary, scanner }
    }
}

#[async_trait]
impl CapsuleRepository for RecoveringRepository {
    async fn get(&self, id: &Uuid) -> CapsuleResult<Option<Capsule>> {
        if let Some(capsule) = self.primary.get(id).await? {
            return Ok(Some(capsule));
        }
        match self.scanner.recover(id).await {
            // A concurrent lookup may have cached (and unlocked) it meanwhile.
            Some(capsule) => Ok(Some(self.primary.put_if_absent(capsule).await?)),
            None => Ok(None),
        }
    }

    async fn put(&self, capsule: Capsule) -> CapsuleResult<()> {
        self.primary.put(capsule).await
    }

    async fn put_if_absent(&self, capsule: Capsule) -> CapsuleResult<Capsule> {
        self.primary.put_if_absent(capsule).await
    }

    async fn list(&self) -> CapsuleResult<Vec<Capsule>> {
        self.primary.list().await
    }

    async fn mark_unlocked(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
        by: &str,
    ) -> CapsuleResult<UnlockTransition> {
        self.primary.mark_unlocked(id, at, by).await
    }
}
