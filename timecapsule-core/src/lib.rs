//! Time-locked capsules.
//!
//! A capsule seals a file (or a message) for one recipient until a point in
//! time. Creation generates a fresh keypair, seals the payload with
//! [`timecapsule_crypto::HybridCipher`], writes a self-describing record to a
//! content-addressed [`timecapsule_blobstore::BlobStore`] and hands the
//! private key to the creator exactly once. Unlocking checks the recipient,
//! then the clock, then opens the package.
//!
//! The local index is replaceable ([`CapsuleRepository`]); the default one
//! rebuilds lost entries from the blob store ([`RecoveryScanner`]).

mod analysis;
mod clock;
mod config;
mod error;
mod manager;
mod recovery;
mod repository;
mod store;
mod types;

pub use analysis::{Compression, FileAnalysis, FileAnalyzer, FileCategory, FileMetadata, FilePackage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CapsuleConfig;
pub use error::{CapsuleError, CapsuleResult, ErrorKind};
pub use manager::CapsuleManager;
pub use recovery::{RecoveringRepository, RecoveryScanner};
pub use repository::{CapsuleRepository, MemoryCapsuleIndex, UnlockTransition};
pub use types::{
    Capsule, CapsuleEncryption, CapsuleRecord, CapsuleRole, CapsuleStats, CapsuleStatus,
    CapsuleStatusView, CreateCapsuleRequest, CreatedCapsule, FileUpload, RecordMetadata,
    UnlockedCapsule, UserCapsule,
};
