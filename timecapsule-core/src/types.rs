//! Capsule data model.

use crate::analysis::{FileAnalysis, FileMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use timecapsule_crypto::EncryptedPackage;
use uuid::Uuid;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleStatus {
    Sealed,
    Unlocked,
}

/// Public key material recorded with a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleEncryption {
    pub algorithm: String,
    /// Encoded public key. The private half is never stored.
    pub public_key: String,
    pub key_created_at: DateTime<Utc>,
}

/// A capsule as tracked by the local index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: Uuid,
    /// Content hash of the durable record in the blob store.
    pub content_ref: String,
    pub file_name: String,
    pub file_type: String,
    pub unlock_timestamp: DateTime<Utc>,
    pub creator_address: String,
    pub recipient_address: String,
    pub message: String,
    pub status: CapsuleStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_by: Option<String>,
    pub encryption: CapsuleEncryption,
    pub file_analysis: FileAnalysis,
}

impl Capsule {
    pub fn can_unlock(&self, now: DateTime<Utc>) -> bool {
        now >= self.unlock_timestamp
    }

    pub fn role_of(&self, address: &str) -> Option<CapsuleRole> {
        if self.creator_address == address {
            Some(CapsuleRole::Creator)
        } else if self.recipient_address == address {
            Some(CapsuleRole::Recipient)
        } else {
            None
        }
    }
}

/// Descriptive fields of the durable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub file_name: String,
    pub file_type: String,
    pub unlock_timestamp: DateTime<Utc>,
    pub recipient_address: String,
    pub creator_address: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub status: CapsuleStatus,
}

/// The self-describing JSON document written to the blob store. Enough to
/// rebuild a [`Capsule`] when the local index is lost; never holds a
/// private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleRecord {
    pub id: Uuid,
    pub encrypted_content: EncryptedPackage,
    pub metadata: RecordMetadata,
    pub encryption: CapsuleEncryption,
    pub file_analysis: FileAnalysis,
}

impl CapsuleRecord {
    /// Rebuilds the indexed view of this record, stored under `content_ref`.
    ///
    /// Records are immutable, so the result is always sealed; whether the
    /// capsule was unlocked before the index was lost is not recoverable.
    pub fn into_capsule(self, content_ref: String) -> Capsule {
        let meta = self.metadata;
        Capsule {
            id: self.id,
            content_ref,
            file_name: meta.file_name,
            file_type: meta.file_type,
            unlock_timestamp: meta.unlock_timestamp,
            creator_address: meta.creator_address,
            recipient_address: meta.recipient_address,
            message: meta.message,
            status: meta.status,
            created_at: meta.created_at,
            unlocked_at: None,
            unlocked_by: None,
            encryption: self.encryption,
            file_analysis: self.file_analysis,
        }
    }
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub name: String,
    /// Declared MIME type, if the uploader sent one.
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCapsuleRequest {
    /// Without a file the message itself is sealed as `message.txt`.
    pub file: Option<FileUpload>,
    pub unlock_timestamp: DateTime<Utc>,
    pub creator_address: String,
    pub recipient_address: String,
    pub message: String,
}

impl CreateCapsuleRequest {
    /// A capsule sealing a file.
    pub fn file(
        bytes: impl Into<Vec<u8>>,
        name: impl Into<String>,
        file_type: Option<&str>,
        unlock_timestamp: DateTime<Utc>,
        creator_address: impl Into<String>,
        recipient_address: impl Into<String>,
    ) -> Self {
        Self {
            file: Some(FileUpload {
                bytes: bytes.into(),
                name: name.into(),
                file_type: file_type.map(str::to_string),
            }),
            unlock_timestamp,
            creator_address: creator_address.into(),
            recipient_address: recipient_address.into(),
            message: String::new(),
        }
    }

    /// A capsule sealing only a message.
    pub fn message(
        message: impl Into<String>,
        unlock_timestamp: DateTime<Utc>,
        creator_address: impl Into<String>,
        recipient_address: impl Into<String>,
    ) -> Self {
        Self {
            file: None,
            unlock_timestamp,
            creator_address: creator_address.into(),
            recipient_address: recipient_address.into(),
            message: message.into(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Result of [`crate::CapsuleManager::create_capsule`]. The only place the
/// capsule's private key is ever surfaced.
pub struct CreatedCapsule {
    pub capsule: Capsule,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for CreatedCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedCapsule")
            .field("capsule", &self.capsule)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleStatusView {
    pub capsule: Capsule,
    pub can_unlock: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnlockedCapsule {
    pub content: Vec<u8>,
    pub file_metadata: FileMetadata,
    pub message: String,
    pub capsule: Capsule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleRole {
    Creator,
    Recipient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCapsule {
    pub capsule: Capsule,
    pub can_unlock: bool,
    pub role: CapsuleRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleStats {
    pub total: usize,
    pub sealed: usize,
    pub unlocked: usize,
    pub algorithm: String,
    pub generated_at: DateTime<Utc>,
}
