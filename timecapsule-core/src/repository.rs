//! Local capsule index.

use crate::error::{CapsuleError, CapsuleResult};
use crate::types::{Capsule, CapsuleStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of [`CapsuleRepository::mark_unlocked`].
#[derive(Debug, Clone, PartialEq)]
pub enum UnlockTransition {
    /// This call moved the capsule from sealed to unlocked.
    Applied(Capsule),
    /// Another caller got there first; the capsule is returned unchanged.
    AlreadyUnlocked(Capsule),
}

impl UnlockTransition {
    pub fn into_capsule(self) -> Capsule {
        match self {
            Self::Applied(c) | Self::AlreadyUnlocked(c) => c,
        }
    }
}

/// Storage for capsule metadata. Never holds private keys.
#[async_trait]
pub trait CapsuleRepository: Send + Sync {
    async fn get(&self, id: &Uuid) -> CapsuleResult<Option<Capsule>>;

    /// Inserts or replaces a capsule.
    async fn put(&self, capsule: Capsule) -> CapsuleResult<()>;

    /// Inserts `capsule` unless its id is already present, and returns the
    /// entry that ends up stored.
    async fn put_if_absent(&self, capsule: Capsule) -> CapsuleResult<Capsule>;

    /// All capsules, oldest first.
    async fn list(&self) -> CapsuleResult<Vec<Capsule>>;

    /// Compare-and-set `Sealed -> Unlocked`. Only the first successful call
    /// records `unlocked_at` and `unlocked_by`.
    async fn mark_unlocked(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
        by: &str,
    ) -> CapsuleResult<UnlockTransition>;
}

/// In-memory index guarded by a tokio `RwLock`.
#[derive(Default)]
pub struct MemoryCapsuleIndex {
    capsules: RwLock<HashMap<Uuid, Capsule>>,
}

impl MemoryCapsuleIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapsuleRepository for MemoryCapsuleIndex {
    async fn get(&self, id: &Uuid) -> CapsuleResult<Option<Capsule>> {
        Ok(self.capsules.read().await.get(id).cloned())
    }

    async fn put(&self, capsule: Capsule) -> CapsuleResult<()> {
        self.capsules.write().await.insert(capsule.id, capsule);
        Ok(())
    }

    async fn put_if_absent(&self, capsule: Capsule) -> CapsuleResult<Capsule> {
        let mut capsules = self.capsules.write().await;
        Ok(capsules.entry(capsule.id).or_insert(capsule).clone())
    }

    async fn list(&self) -> CapsuleResult<Vec<Capsule>> {
        let mut all: Vec<Capsule> = self.capsules.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn mark_unlocked(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
        by: &str,
    ) -> CapsuleResult<UnlockTransition> {
        let mut capsules = self.capsules.write().await;
        let capsule = capsules
            .get_mut(id)
            .ok_or_else(|| CapsuleError::NotFound(id.to_string()))?;

        if capsule.status == CapsuleStatus::Unlocked {
            return Ok(UnlockTransition::AlreadyUnlocked(capsule.clone()));
        }
        capsule.status = CapsuleStatus::Unlocked;
        capsule.unlocked_at = Some(at);
        capsule.unlocked_by = Some(by.to_string());
        Ok(UnlockTransition::Applied(capsule.clone()))
    }
}
