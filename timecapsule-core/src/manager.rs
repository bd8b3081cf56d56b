//! Capsule lifecycle: create, inspect, unlock.
//!
//! A capsule moves `Sealed -> Unlocked` exactly once, and only when the
//! requester is the recipient, the unlock time has passed and the supplied
//! private key opens the sealed package.

use crate::analysis::{FileAnalyzer, FilePackage};
use crate::clock::{Clock, SystemClock};
use crate::config::CapsuleConfig;
use crate::error::{CapsuleError, CapsuleResult};
use crate::recovery::{RecoveringRepository, RecoveryScanner};
use crate::repository::{CapsuleRepository, MemoryCapsuleIndex, UnlockTransition};
use crate::store::bounded;
use crate::types::{
    Capsule, CapsuleEncryption, CapsuleRecord, CapsuleStats, CapsuleStatus, CapsuleStatusView,
    CreateCapsuleRequest, CreatedCapsule, RecordMetadata, UnlockedCapsule, UserCapsule,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use timecapsule_blobstore::BlobStore;
use timecapsule_crypto::{HybridCipher, HybridPrivateKey};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

const MESSAGE_FILE_NAME: &str = "message.txt";
const MESSAGE_FILE_TYPE: &str = "text/plain";
const UNNAMED_FILE: &str = "unknown_file";

pub struct CapsuleManager {
    cipher: Arc<HybridCipher>,
    analyzer: FileAnalyzer,
    store: Arc<dyn BlobStore>,
    repository: Arc<dyn CapsuleRepository>,
    clock: Arc<dyn Clock>,
    config: CapsuleConfig,
}

impl CapsuleManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_config(store, CapsuleConfig::default())
    }

    /// Builds a manager over `store` with an in-memory index that recovers
    /// missing capsules from the store.
    pub fn with_config(store: Arc<dyn BlobStore>, config: CapsuleConfig) -> Self {
        let scanner = RecoveryScanner::new(Arc::clone(&store), config.clone());
        let repository = RecoveringRepository::new(Arc::new(MemoryCapsuleIndex::new()), scanner);
        Self {
            cipher: Arc::new(HybridCipher::new().requiring_tag(config.require_package_tag)),
            analyzer: FileAnalyzer::new(),
            store,
            repository: Arc::new(repository),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the capsule index. The caller decides whether it recovers.
    pub fn with_repository(mut self, repository: Arc<dyn CapsuleRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn config(&self) -> &CapsuleConfig {
        &self.config
    }

    /// Algorithm id written into new capsules.
    pub fn algorithm(&self) -> &str {
        self.cipher.algorithm_id()
    }

    /// Seals a new capsule and returns it with its private key. The key is
    /// not kept anywhere; losing it makes the capsule unopenable.
    pub async fn create_capsule(
        &self,
        request: CreateCapsuleRequest,
    ) -> CapsuleResult<CreatedCapsule> {
        let now = self.clock.now();
        validate_create(&request, now)?;

        let CreateCapsuleRequest {
            file,
            unlock_timestamp,
            creator_address,
            recipient_address,
            message,
        } = request;
        let (bytes, file_name, declared_type) = match file {
            Some(upload) => {
                let name = if upload.name.trim().is_empty() {
                    UNNAMED_FILE.to_string()
                } else {
                    upload.name
                };
                (upload.bytes, name, upload.file_type)
            }
            None => (
                message.clone().into_bytes(),
                MESSAGE_FILE_NAME.to_string(),
                Some(MESSAGE_FILE_TYPE.to_string()),
            ),
        };

        let package = self
            .analyzer
            .package(&bytes, &file_name, declared_type.as_deref(), now);
        let analysis = package.analysis.clone();
        let file_type = package.metadata.original_type.clone();
        let payload = Zeroizing::new(serde_json::to_vec(&package).map_err(|e| {
            CapsuleError::Encryption(format!("payload serialization failed: {e}"))
        })?);
        drop(package);

        let cipher = Arc::clone(&self.cipher);
        let (encrypted_content, public_key, private_key, key_created_at) =
            tokio::task::spawn_blocking(move || {
                let keypair = cipher.generate_keypair().map_err(CapsuleError::sealing)?;
                let sealed = cipher
                    .encrypt(&payload, &keypair.public)
                    .map_err(CapsuleError::sealing)?;
                let public_key = keypair.public.encode().map_err(CapsuleError::sealing)?;
                let private_key = keypair.private.encode().map_err(CapsuleError::sealing)?;
                Ok::<_, CapsuleError>((sealed, public_key, private_key, keypair.created_at))
            })
            .await
            .map_err(|e| CapsuleError::Encryption(format!("sealing task failed: {e}")))??;

        let id = Uuid::new_v4();
        let record = CapsuleRecord {
            id,
            encrypted_content,
            metadata: RecordMetadata {
                file_name,
                file_type,
                unlock_timestamp,
                recipient_address,
                creator_address,
                message,
                created_at: now,
                status: CapsuleStatus::Sealed,
            },
            encryption: CapsuleEncryption {
                algorithm: self.cipher.algorithm_id().to_string(),
                public_key,
                key_created_at,
            },
            file_analysis: analysis,
        };
        let json = serde_json::to_vec(&record)
            .map_err(|e| CapsuleError::Storage(format!("record serialization failed: {e}")))?;

        let name = self.config.record_name(&id);
        let receipt = bounded(
            "put",
            self.config.store_timeout(),
            self.store.put(&json, &name),
        )
        .await?;
        debug!(capsule_id = %id, hash = %receipt.hash, size = json.len(), "stored capsule record");

        let capsule = record.into_capsule(receipt.hash);
        self.repository.put(capsule.clone()).await?;
        info!(
            capsule_id = %id,
            unlock_at = %capsule.unlock_timestamp,
            size = capsule.file_analysis.size,
            category = ?capsule.file_analysis.category,
            "capsule sealed"
        );

        Ok(CreatedCapsule {
            capsule,
            private_key,
        })
    }

    pub async fn get_status(&self, capsule_id: &str) -> CapsuleResult<CapsuleStatusView> {
        let capsule = self.resolve(capsule_id).await?;
        Ok(CapsuleStatusView {
            can_unlock: capsule.can_unlock(self.clock.now()),
            capsule,
        })
    }

    /// Opens a capsule for its recipient.
    ///
    /// Authorization and the time lock are checked before any storage or
    /// cryptographic work. Authorization goes first on purpose, so anyone
    /// but the recipient gets `Authorization` whatever the clock says.
    /// Concurrent unlocks may all succeed, but only the first records
    /// `unlocked_at` / `unlocked_by`.
    pub async fn unlock(
        &self,
        capsule_id: &str,
        private_key: &str,
        requester_address: &str,
    ) -> CapsuleResult<UnlockedCapsule> {
        if capsule_id.trim().is_empty() {
            return Err(CapsuleError::Validation("capsule id is required".into()));
        }
        if private_key.trim().is_empty() {
            return Err(CapsuleError::Validation("private key is required".into()));
        }
        if requester_address.trim().is_empty() {
            return Err(CapsuleError::Validation("requester address is required".into()));
        }

        let now = self.clock.now();
        let capsule = self.resolve(capsule_id).await?;

        if requester_address != capsule.recipient_address {
            warn!(capsule_id = %capsule.id, "unlock attempted by non-recipient");
            return Err(CapsuleError::Authorization(
                "only the recipient can unlock this capsule".into(),
            ));
        }
        if !capsule.can_unlock(now) {
            return Err(CapsuleError::TimeLock {
                unlock_at: capsule.unlock_timestamp,
            });
        }

        let key = HybridPrivateKey::decode(private_key)
            .map_err(|e| CapsuleError::Validation(format!("malformed private key: {e}")))?;

        let bytes = bounded(
            "get",
            self.config.store_timeout(),
            self.store.get(&capsule.content_ref),
        )
        .await?;
        let record: CapsuleRecord = serde_json::from_slice(&bytes)
            .map_err(|e| CapsuleError::Storage(format!("malformed capsule record: {e}")))?;
        if record.id != capsule.id {
            return Err(CapsuleError::Storage(format!(
                "record {} does not belong to capsule {}",
                capsule.content_ref, capsule.id
            )));
        }

        let cipher = Arc::clone(&self.cipher);
        let sealed = record.encrypted_content;
        let plaintext = Zeroizing::new(
            tokio::task::spawn_blocking(move || cipher.decrypt(&sealed, &key))
                .await
                .map_err(|e| CapsuleError::Decryption(format!("decryption task failed: {e}")))??,
        );
        let package: FilePackage = serde_json::from_slice(&plaintext).map_err(|e| {
            CapsuleError::Decryption(format!("decrypted payload is not a file package: {e}"))
        })?;

        let capsule = match self
            .repository
            .mark_unlocked(&capsule.id, now, requester_address)
            .await?
        {
            UnlockTransition::Applied(capsule) => {
                info!(capsule_id = %capsule.id, "capsule unlocked");
                capsule
            }
            UnlockTransition::AlreadyUnlocked(capsule) => {
                debug!(capsule_id = %capsule.id, "capsule was already unlocked");
                capsule
            }
        };

        Ok(UnlockedCapsule {
            content: package.content,
            file_metadata: package.metadata,
            message: capsule.message.clone(),
            capsule,
        })
    }

    /// Capsules in the local index created by or addressed to `address`,
    /// oldest first.
    pub async fn list_by_user(&self, address: &str) -> CapsuleResult<Vec<UserCapsule>> {
        if address.trim().is_empty() {
            return Err(CapsuleError::Validation("address is required".into()));
        }
        let now = self.clock.now();
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .filter_map(|capsule| {
                let role = capsule.role_of(address)?;
                Some(UserCapsule {
                    can_unlock: capsule.can_unlock(now),
                    role,
                    capsule,
                })
            })
            .collect())
    }

    pub async fn stats(&self) -> CapsuleResult<CapsuleStats> {
        let all = self.repository.list().await?;
        let unlocked = all
            .iter()
            .filter(|c| c.status == CapsuleStatus::Unlocked)
            .count();
        Ok(CapsuleStats {
            total: all.len(),
            sealed: all.len() - unlocked,
            unlocked,
            algorithm: self.cipher.algorithm_id().to_string(),
            generated_at: self.clock.now(),
        })
    }

    async fn resolve(&self, capsule_id: &str) -> CapsuleResult<Capsule> {
        let capsule_id = capsule_id.trim();
        if capsule_id.is_empty() {
            return Err(CapsuleError::Validation("capsule id is required".into()));
        }
        let id = Uuid::parse_str(capsule_id)
            .map_err(|_| CapsuleError::NotFound(capsule_id.to_string()))?;
        self.repository
            .get(&id)
            .await?
            .ok_or_else(|| CapsuleError::NotFound(id.to_string()))
    }
}

fn validate_create(request: &CreateCapsuleRequest, now: DateTime<Utc>) -> CapsuleResult<()> {
    let creator = request.creator_address.trim();
    let recipient = request.recipient_address.trim();
    if creator.is_empty() {
        return Err(CapsuleError::Validation("creator address is required".into()));
    }
    if recipient.is_empty() {
        return Err(CapsuleError::Validation("recipient address is required".into()));
    }
    if creator == recipient {
        return Err(CapsuleError::Validation(
            "creator and recipient must be different addresses".into(),
        ));
    }
    if request.unlock_timestamp <= now {
        return Err(CapsuleError::Validation(
            "unlock time must be in the future".into(),
        ));
    }
    let empty = match &request.file {
        Some(upload) => upload.bytes.is_empty(),
        None => request.message.is_empty(),
    };
    if empty {
        return Err(CapsuleError::Validation("capsule content is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(unlock: DateTime<Utc>) -> CreateCapsuleRequest {
        CreateCapsuleRequest::message("hi", unlock, "alice", "bob")
    }

    #[test]
    fn create_validation_rules() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        assert!(validate_create(&request(later), now).is_ok());

        let cases = [
            CreateCapsuleRequest::message("hi", later, "", "bob"),
            CreateCapsuleRequest::message("hi", later, "alice", "  "),
            CreateCapsuleRequest::message("hi", later, "alice", "alice"),
            CreateCapsuleRequest::message("", later, "alice", "bob"),
            CreateCapsuleRequest::file(Vec::new(), "a.bin", None, later, "alice", "bob"),
            request(now),
            request(now - Duration::seconds(1)),
        ];
        for case in cases {
            let err = validate_create(&case, now).unwrap_err();
            assert!(matches!(err, CapsuleError::Validation(_)), "{case:?}: {err}");
        }
    }
}
